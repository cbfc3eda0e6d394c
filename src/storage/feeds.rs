use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedRow, FeedWithOwner};

/// Columns selected for every `Feed` read
pub(crate) const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at";

/// Least recently fetched first, never-fetched before everything, ties by insertion order
pub(crate) const NEXT_FEED_ORDER: &str =
    "ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`. A duplicate URL surfaces as a unique violation.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: FeedRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at) VALUES (?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Feed::from))
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Feed::from))
    }

    /// All feeds joined with the name of the user who added them
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.name, f.url, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Peek at the feed the next ingestion cycle would pick, outside any transaction.
    pub async fn peek_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds {NEXT_FEED_ORDER} LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Feed::from))
    }
}
