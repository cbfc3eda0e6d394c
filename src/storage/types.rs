use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another gather process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }

    /// True when the error is a UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Other(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Timestamp helpers
// ============================================================================

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            user_id: row.user_id,
            last_fetched_at: row.last_fetched_at.map(from_millis),
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            feed_id: row.feed_id,
            title: row.title,
            url: row.url,
            description: row.description,
            published_at: row.published_at.map(from_millis),
            created_at: from_millis(row.created_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A subscribed feed.
///
/// `last_fetched_at` is the fetch cursor: the feed with the oldest (or no)
/// value is the next one the aggregator picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Feed listing entry joined with its owner's name
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

/// A stored feed item. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Post to be inserted by an ingestion cycle
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Result of inserting a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written, carrying its id
    Inserted(i64),
    /// A post with the same (feed_id, url) already exists
    Duplicate,
}
