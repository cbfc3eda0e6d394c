//! gather: a command-line feed aggregator.
//!
//! Users register, add RSS feeds and follow them; `agg` polls one feed per
//! interval and stores new posts in SQLite, and `browse` lists the newest
//! posts from followed feeds.

pub mod aggregator;
pub mod commands;
pub mod config;
pub mod feed;
pub mod session;
pub mod storage;
pub mod util;
