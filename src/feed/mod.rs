//! Feed retrieval for the aggregator.
//!
//! - [`fetcher`] - HTTP retrieval with size limits and a fixed client header
//! - [`parser`] - RSS 2.0 channel/item parsing with HTML-entity decoding
//! - [`pubdate`] - Normalization of the many `pubDate` spellings found in the wild

mod fetcher;
mod parser;
mod pubdate;

pub use fetcher::{build_client, fetch_feed, FetchError, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
pub use parser::{parse_document, FeedDocument, FeedItem};
pub use pubdate::{normalize_pub_date, PubDateError};
