//! pricefeed core: price store, market-data client, backfill engine, trend projection.
//!
//! This crate contains:
//! - Domain types (observations, insert results)
//! - SQLite price store with timestamp-level deduplication
//! - Range-query market-data client with nearest-sample selection
//! - Backfill engine with gap retries and rate-limit pacing
//! - TOML configuration
//! - Linear trend fit and projection over the stored series

pub mod config;
pub mod data;
pub mod domain;
pub mod trend;

pub use config::{ConfigError, FeedConfig};
pub use domain::{InsertResult, PriceObservation};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types handed across the CLI boundary are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::PriceObservation>();
        require_sync::<domain::PriceObservation>();
        require_send::<data::PriceStore>();
        require_sync::<data::PriceStore>();
        require_send::<data::MarketDataClient>();
        require_sync::<data::MarketDataClient>();
        require_send::<data::BackfillSummary>();
        require_sync::<data::BackfillSummary>();
        require_send::<config::FeedConfig>();
        require_sync::<config::FeedConfig>();
        require_send::<trend::TrendModel>();
        require_sync::<trend::TrendModel>();
    }

    /// Compile-time check: the client coerces to a `PriceSource` trait object.
    #[allow(dead_code)]
    fn market_data_client_is_a_price_source(
        client: &data::MarketDataClient,
    ) -> &dyn data::PriceSource {
        client
    }
}
