use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. A duplicate name surfaces as a unique violation.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (name, created_at) VALUES (?, ?)
             RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, created_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// All users in registration order
    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT id, name, created_at FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them via cascade.
    ///
    /// Returns the number of users removed.
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
