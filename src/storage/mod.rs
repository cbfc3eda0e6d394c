mod feeds;
mod follows;
mod ingest;
mod posts;
mod schema;
mod types;
mod users;

pub use ingest::IngestTx;
pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedWithOwner, InsertOutcome, NewPost, Post, User};
