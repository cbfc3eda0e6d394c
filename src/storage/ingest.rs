//! Transactional scope for one ingestion cycle.
//!
//! Every store operation an ingestion cycle performs goes through [`IngestTx`].
//! Nothing is visible to other readers until [`IngestTx::commit`]; dropping the
//! scope without committing rolls everything back, including the fetch stamp.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use super::feeds::{FEED_COLUMNS, NEXT_FEED_ORDER};
use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedRow, InsertOutcome, NewPost};

/// One open ingestion transaction
pub struct IngestTx {
    tx: Transaction<'static, Sqlite>,
}

impl Database {
    /// Open the transactional scope for an ingestion cycle.
    pub async fn begin_ingest(&self) -> Result<IngestTx, DatabaseError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        Ok(IngestTx { tx })
    }
}

impl IngestTx {
    /// The feed with the oldest `last_fetched_at`, never-fetched feeds first.
    /// Ties resolve by insertion order.
    pub async fn select_next_feed_to_fetch(&mut self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds {NEXT_FEED_ORDER} LIMIT 1"
        ))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Feed::from))
    }

    /// Stamp the fetch cursor of `feed_id`.
    pub async fn mark_feed_fetched(
        &mut self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(to_millis(at))
            .bind(feed_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Insert a post unless one with the same (feed_id, url) already exists.
    pub async fn insert_post(&mut self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_id, url) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(to_millis(Utc::now()))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match row {
            Some((id,)) => InsertOutcome::Inserted(id),
            None => InsertOutcome::Duplicate,
        })
    }

    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await.map_err(DatabaseError::from_sqlx)
    }

    /// Explicit rollback. Dropping the scope has the same effect.
    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await.map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn db_with_user() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        (db, user.id)
    }

    fn new_post(feed_id: i64, url: &str) -> NewPost {
        NewPost {
            feed_id,
            title: Some("Title".into()),
            url: url.into(),
            description: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_select_on_empty_store() {
        let (db, _) = db_with_user().await;
        let mut tx = db.begin_ingest().await.unwrap();
        assert!(tx.select_next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_prefers_never_fetched_then_oldest() {
        let (db, user_id) = db_with_user().await;
        let a = db.create_feed("A", "https://a.example/rss", user_id).await.unwrap();
        let b = db.create_feed("B", "https://b.example/rss", user_id).await.unwrap();
        let c = db.create_feed("C", "https://c.example/rss", user_id).await.unwrap();

        let base = Utc::now();
        let mut tx = db.begin_ingest().await.unwrap();
        tx.mark_feed_fetched(a.id, base).await.unwrap();
        tx.mark_feed_fetched(b.id, base - Duration::minutes(5)).await.unwrap();
        // C never fetched: selected first
        assert_eq!(tx.select_next_feed_to_fetch().await.unwrap().unwrap().id, c.id);

        tx.mark_feed_fetched(c.id, base + Duration::minutes(1)).await.unwrap();
        assert_eq!(tx.select_next_feed_to_fetch().await.unwrap().unwrap().id, b.id);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_ties_break_by_insertion_order() {
        let (db, user_id) = db_with_user().await;
        let first = db.create_feed("First", "https://1.example/rss", user_id).await.unwrap();
        let second = db.create_feed("Second", "https://2.example/rss", user_id).await.unwrap();

        let mut tx = db.begin_ingest().await.unwrap();
        assert_eq!(tx.select_next_feed_to_fetch().await.unwrap().unwrap().id, first.id);

        let at = Utc::now();
        tx.mark_feed_fetched(first.id, at).await.unwrap();
        tx.mark_feed_fetched(second.id, at).await.unwrap();
        assert_eq!(tx.select_next_feed_to_fetch().await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_insert_post_reports_duplicates() {
        let (db, user_id) = db_with_user().await;
        let feed = db.create_feed("A", "https://a.example/rss", user_id).await.unwrap();

        let mut tx = db.begin_ingest().await.unwrap();
        let first = tx.insert_post(&new_post(feed.id, "https://a.example/1")).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));
        let again = tx.insert_post(&new_post(feed.id, "https://a.example/1")).await.unwrap();
        assert_eq!(again, InsertOutcome::Duplicate);
        tx.commit().await.unwrap();

        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_url_in_different_feeds_is_not_a_duplicate() {
        let (db, user_id) = db_with_user().await;
        let a = db.create_feed("A", "https://a.example/rss", user_id).await.unwrap();
        let b = db.create_feed("B", "https://b.example/rss", user_id).await.unwrap();

        let mut tx = db.begin_ingest().await.unwrap();
        let shared = "https://news.example/story";
        assert!(matches!(
            tx.insert_post(&new_post(a.id, shared)).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert!(matches!(
            tx.insert_post(&new_post(b.id, shared)).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        tx.commit().await.unwrap();
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back_stamp_and_posts() {
        let (db, user_id) = db_with_user().await;
        let feed = db.create_feed("A", "https://a.example/rss", user_id).await.unwrap();

        {
            let mut tx = db.begin_ingest().await.unwrap();
            tx.mark_feed_fetched(feed.id, Utc::now()).await.unwrap();
            tx.insert_post(&new_post(feed.id, "https://a.example/1")).await.unwrap();
        }

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_none());
        assert_eq!(db.count_posts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_rollback() {
        let (db, user_id) = db_with_user().await;
        let feed = db.create_feed("A", "https://a.example/rss", user_id).await.unwrap();

        let mut tx = db.begin_ingest().await.unwrap();
        tx.mark_feed_fetched(feed.id, Utc::now()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(db.get_feed(feed.id).await.unwrap().unwrap().last_fetched_at.is_none());
    }
}
