//! Backfill orchestrator: resolves each target instant through the price
//! source and the store, with gap retries and rate-limit pacing.
//!
//! Per target:
//! 1. fetch the nearest price
//! 2. on success, insert it; a duplicate is done, not retried
//! 3. on a gap, cool down, then try again up to `max_attempts` fetches in
//!    total; the last gap also cools down before the target is skipped
//! 4. on an upstream error, skip without cooling down
//!
//! Every `pacing_batch`-th newly inserted point is followed by a pacing
//! cooldown before the next target. Store failures abort the run.

use super::cooldown::{CooldownReason, Sleeper};
use super::provider::{BackfillProgress, FetchError, PriceSource};
use super::store::{PriceStore, StoreError};
use crate::domain::{InsertResult, PriceObservation};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Retry and pacing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Fetches per target before a gap is tolerated as a skip.
    pub max_attempts: u32,
    /// Wait after every gap, including the one that exhausts the attempts.
    pub gap_cooldown: Duration,
    /// Pace after every this many newly inserted points.
    pub pacing_batch: usize,
    /// Wait after each pacing batch.
    pub pacing_cooldown: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            gap_cooldown: Duration::from_secs(60),
            pacing_batch: 5,
            pacing_cooldown: Duration::from_secs(60),
        }
    }
}

impl BackfillConfig {
    /// Same counts, no waiting.
    pub fn without_cooldowns(mut self) -> Self {
        self.gap_cooldown = Duration::ZERO;
        self.pacing_cooldown = Duration::ZERO;
        self
    }
}

/// How a single target was resolved.
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Inserted { price: f64 },
    Duplicate { existing_price: f64 },
    /// Every attempt came back empty.
    Gap { attempts: u32 },
    /// Upstream failure; not retried.
    Failed(FetchError),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("price store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a backfill run.
#[derive(Debug, Default)]
pub struct BackfillSummary {
    /// Targets processed.
    pub total: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Targets skipped after exhausting gap retries.
    pub gaps: usize,
    /// Targets skipped on an upstream error.
    pub upstream_failures: usize,
    pub gap_cooldowns: usize,
    pub pacing_cooldowns: usize,
    /// Skipped targets with the last error seen for each.
    pub skipped: Vec<(DateTime<Utc>, FetchError)>,
}

impl BackfillSummary {
    pub fn skipped_count(&self) -> usize {
        self.gaps + self.upstream_failures
    }

    pub fn all_resolved(&self) -> bool {
        self.skipped_count() == 0
    }
}

/// Drives a one-shot backfill over a list of target instants.
pub struct Ingestor<'a> {
    source: &'a dyn PriceSource,
    store: &'a PriceStore,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn BackfillProgress,
    config: BackfillConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        source: &'a dyn PriceSource,
        store: &'a PriceStore,
        sleeper: &'a dyn Sleeper,
        progress: &'a dyn BackfillProgress,
        config: BackfillConfig,
    ) -> Self {
        Self {
            source,
            store,
            sleeper,
            progress,
            config,
        }
    }

    /// Process every target once, in order.
    ///
    /// Fetch failures never abort the run; only store failures do.
    pub fn run(&self, targets: &[DateTime<Utc>]) -> Result<BackfillSummary, BackfillError> {
        let total = targets.len();
        let mut summary = BackfillSummary {
            total,
            ..Default::default()
        };

        for (i, &at) in targets.iter().enumerate() {
            self.progress.on_start(at, i, total);
            let outcome = self.resolve(at, &mut summary)?;
            self.progress.on_outcome(at, i, total, &outcome);

            match outcome {
                TargetOutcome::Inserted { .. } => {
                    summary.inserted += 1;
                    let batch = self.config.pacing_batch.max(1);
                    if summary.inserted % batch == 0 && i + 1 < total {
                        self.cool_down(CooldownReason::Pacing, &mut summary);
                    }
                }
                TargetOutcome::Duplicate { .. } => summary.duplicates += 1,
                TargetOutcome::Gap { .. } => summary.gaps += 1,
                TargetOutcome::Failed(e) => {
                    summary.upstream_failures += 1;
                    summary.skipped.push((at, e));
                }
            }
        }

        self.progress.on_batch_complete(&summary);
        Ok(summary)
    }

    /// Resolve one target, including all gap retries.
    fn resolve(
        &self,
        at: DateTime<Utc>,
        summary: &mut BackfillSummary,
    ) -> Result<TargetOutcome, BackfillError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.source.fetch_near(at) {
                Ok(price) => {
                    let obs = PriceObservation::new(at, price);
                    return Ok(match self.store.insert(&obs)? {
                        InsertResult::Inserted { price } => TargetOutcome::Inserted { price },
                        InsertResult::AlreadyPresent { existing_price } => {
                            TargetOutcome::Duplicate { existing_price }
                        }
                    });
                }
                Err(e) if e.is_gap() => {
                    // The final empty window waits too.
                    self.cool_down(CooldownReason::Gap, summary);
                    if attempt >= max_attempts {
                        summary.skipped.push((at, e));
                        return Ok(TargetOutcome::Gap { attempts: attempt });
                    }
                    attempt += 1;
                }
                Err(e) => return Ok(TargetOutcome::Failed(e)),
            }
        }
    }

    fn cool_down(&self, reason: CooldownReason, summary: &mut BackfillSummary) {
        let duration = match reason {
            CooldownReason::Gap => {
                summary.gap_cooldowns += 1;
                self.config.gap_cooldown
            }
            CooldownReason::Pacing => {
                summary.pacing_cooldowns += 1;
                self.config.pacing_cooldown
            }
        };
        self.progress.on_cooldown(reason, duration);
        self.sleeper.pause(reason, duration);
    }
}
