use super::schema::Database;
use super::types::{DatabaseError, Post, PostRow};

const POST_COLUMNS: &str = "p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Newest posts from the feeds a user follows.
    ///
    /// Ordered by publish time, newest first. Posts without a publish time
    /// come last, newest insert first.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at IS NULL, p.published_at DESC, p.id DESC
            LIMIT ?
        "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// All posts of one feed in insertion order
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.feed_id = ? ORDER BY p.id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
