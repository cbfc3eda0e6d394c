//! Scheduled feed ingestion.
//!
//! [`Scheduler`] ticks on a fixed interval and runs one [`scrape_next_feed`]
//! cycle per tick. Each cycle picks the least recently fetched feed, stamps
//! it, fetches it and stores new posts inside a single transaction.

mod cycle;
mod scheduler;

pub use cycle::{scrape_next_feed, CycleReport};
pub use scheduler::Scheduler;

use crate::feed::FetchError;
use crate::storage::DatabaseError;
use thiserror::Error;

/// Why an ingestion cycle ended without committing.
///
/// Every variant is recoverable: the scheduler logs it and the next tick runs.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The store holds no feeds
    #[error("No feeds available to fetch")]
    NoFeedsAvailable,

    /// Retrieval or parsing failed; the fetch stamp was rolled back
    #[error("Failed to fetch feed {name:?} ({url}): {source}")]
    Fetch {
        feed_id: i64,
        name: String,
        url: String,
        #[source]
        source: FetchError,
    },

    /// A store operation or the commit failed
    #[error(transparent)]
    Store(#[from] DatabaseError),
}
