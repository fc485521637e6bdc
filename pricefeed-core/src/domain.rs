//! Domain types shared by the store, the client and the backfill engine.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A single (timestamp, price) sample for the tracked instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Instant of the sample, truncated to whole seconds.
    pub timestamp: DateTime<Utc>,
    /// Price in the quote currency (USD by default).
    pub price: f64,
}

impl PriceObservation {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            price,
        }
    }
}

/// Outcome of [`PriceStore::insert`](crate::data::PriceStore::insert).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertResult {
    /// No observation existed at this timestamp; the new one was stored.
    Inserted { price: f64 },
    /// An observation already existed; nothing was written.
    AlreadyPresent { existing_price: f64 },
}

impl InsertResult {
    pub fn inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted { .. })
    }

    /// The price now stored at the timestamp (the pre-existing one for duplicates).
    pub fn price(&self) -> f64 {
        match *self {
            InsertResult::Inserted { price } => price,
            InsertResult::AlreadyPresent { existing_price } => existing_price,
        }
    }
}
