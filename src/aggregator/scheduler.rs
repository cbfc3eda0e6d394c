use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use super::{CycleReport, IngestError};
use crate::config::ConfigError;

/// Fixed-interval driver for ingestion cycles.
///
/// The first cycle runs immediately. Cycles never overlap: the next tick is
/// only awaited once the current cycle has finished, and a cycle that overruns
/// the interval is followed straight away by the next one.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInterval`] for a zero interval.
    pub fn new(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `cycle` once per tick until the process exits.
    ///
    /// A failed cycle is logged and does not stop the loop.
    pub async fn run<F, Fut>(&self, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleReport, IngestError>>,
    {
        tracing::info!(interval = ?self.interval, "Collecting feeds");

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            log_cycle(&cycle().await);
        }
    }
}

fn log_cycle(result: &Result<CycleReport, IngestError>) {
    match result {
        Ok(report) => tracing::info!(
            feed_id = report.feed_id,
            feed = %report.feed_name,
            items = report.items,
            new_posts = report.inserted,
            duplicates = report.duplicates,
            undated = report.undated,
            skipped = report.skipped,
            "Feed collected"
        ),
        Err(IngestError::NoFeedsAvailable) => {
            tracing::info!("No feeds to fetch, add one with `gather addfeed <name> <url>`")
        }
        Err(IngestError::Fetch {
            feed_id,
            url,
            source,
            ..
        }) => tracing::warn!(
            feed_id = *feed_id,
            url = %url,
            error = %source,
            "Feed fetch failed, will retry next cycle"
        ),
        Err(e @ IngestError::Store(_)) => {
            tracing::error!(error = %e, "Ingestion cycle rolled back")
        }
    }
}
