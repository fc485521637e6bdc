//! Price source trait, structured fetch errors and progress callbacks.
//!
//! The PriceSource trait abstracts over the upstream market-data API so the
//! backfill engine can be driven by a scripted source in tests.

use super::backfill::{BackfillSummary, TargetOutcome};
use super::cooldown::CooldownReason;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Failure to resolve a price for one target instant.
///
/// `NoData` is a gap and may be retried; `Upstream` is not.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("no price samples between {from} and {to}")]
    NoData {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl FetchError {
    pub fn is_gap(&self) -> bool {
        matches!(self, FetchError::NoData { .. })
    }
}

/// Transport-level or malformed-response failures.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from provider")]
    HttpStatus { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),
}

/// A source that can resolve "the price at instant T".
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Price of the sample closest to `at`.
    fn fetch_near(&self, at: DateTime<Utc>) -> Result<f64, FetchError>;
}

/// Progress callback for a backfill run.
pub trait BackfillProgress {
    /// Called before the first fetch for a target.
    fn on_start(&self, at: DateTime<Utc>, index: usize, total: usize);

    /// Called once a target is resolved (stored, duplicate or skipped).
    fn on_outcome(&self, at: DateTime<Utc>, index: usize, total: usize, outcome: &TargetOutcome);

    /// Called before every cooldown wait.
    fn on_cooldown(&self, reason: CooldownReason, duration: Duration);

    /// Called when the whole run is done.
    fn on_batch_complete(&self, summary: &BackfillSummary);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl BackfillProgress for LogProgress {
    fn on_start(&self, at: DateTime<Utc>, index: usize, total: usize) {
        info!(target_time = %at, "[{}/{}] fetching price", index + 1, total);
    }

    fn on_outcome(&self, at: DateTime<Utc>, _index: usize, _total: usize, outcome: &TargetOutcome) {
        match outcome {
            TargetOutcome::Inserted { price } => {
                info!(target_time = %at, price = *price, "stored new price")
            }
            TargetOutcome::Duplicate { existing_price } => info!(
                target_time = %at,
                existing_price = *existing_price,
                "price already in store"
            ),
            TargetOutcome::Gap { attempts } => {
                warn!(target_time = %at, attempts, "no price found, skipping")
            }
            TargetOutcome::Failed(e) => {
                warn!(target_time = %at, error = %e, "unexpected error, skipping")
            }
        }
    }

    fn on_cooldown(&self, reason: CooldownReason, duration: Duration) {
        info!(reason = %reason, secs = duration.as_secs(), "pausing");
    }

    fn on_batch_complete(&self, summary: &BackfillSummary) {
        info!(
            total = summary.total,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            gaps = summary.gaps,
            upstream_failures = summary.upstream_failures,
            "backfill complete"
        );
    }
}

/// Progress reporter that discards every event.
pub struct SilentProgress;

impl BackfillProgress for SilentProgress {
    fn on_start(&self, _at: DateTime<Utc>, _index: usize, _total: usize) {}

    fn on_outcome(
        &self,
        _at: DateTime<Utc>,
        _index: usize,
        _total: usize,
        _outcome: &TargetOutcome,
    ) {
    }

    fn on_cooldown(&self, _reason: CooldownReason, _duration: Duration) {}

    fn on_batch_complete(&self, _summary: &BackfillSummary) {}
}
