use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed. Following twice is a no-op.
    ///
    /// Returns `true` when a new follow was recorded.
    pub async fn follow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO feed_follows (user_id, feed_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, feed_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` when a follow existed and was removed.
    pub async fn unfollow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Names of the feeds a user follows, in follow order
    pub async fn get_followed_feed_names(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT f.name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
