//! Data ingestion: upstream client, durable store and the backfill engine.

pub mod backfill;
pub mod coingecko;
pub mod cooldown;
pub mod provider;
pub mod schedule;
pub mod store;

pub use backfill::{
    BackfillConfig, BackfillError, BackfillSummary, Ingestor, TargetOutcome,
};
pub use coingecko::{MarketDataClient, DEFAULT_BASE_URL};
pub use cooldown::{CooldownReason, RecordingSleeper, Sleeper, ThreadSleeper};
pub use provider::{
    BackfillProgress, FetchError, LogProgress, PriceSource, SilentProgress, UpstreamError,
};
pub use schedule::BackfillWindow;
pub use store::{PriceStore, StoreError};
