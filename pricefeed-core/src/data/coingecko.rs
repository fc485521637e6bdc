//! CoinGecko market-chart range client.
//!
//! The API only answers range queries, so "the price at T" is resolved by
//! asking for `[T - window, T + window]` and keeping the sample closest to T.
//! One HTTP round trip per call; retry policy belongs to the backfill engine.

use super::provider::{FetchError, PriceSource, UpstreamError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Range endpoint for Bitcoin.
pub const DEFAULT_BASE_URL: &str =
    "https://api.coingecko.com/api/v3/coins/bitcoin/market_chart/range";

/// Market-chart range response. Other fields (`market_caps`, `total_volumes`) are ignored.
#[derive(Debug, Deserialize)]
struct RangeResponse {
    prices: Option<Vec<[f64; 2]>>,
}

/// Blocking client for the range endpoint.
pub struct MarketDataClient {
    client: reqwest::blocking::Client,
    base_url: String,
    vs_currency: String,
    window: Duration,
}

impl MarketDataClient {
    pub fn new(
        base_url: impl Into<String>,
        vs_currency: impl Into<String>,
        window: Duration,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pricefeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::NetworkUnreachable(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            vs_currency: vs_currency.into(),
            window,
        })
    }

    /// Query bounds, in epoch seconds, for a target instant.
    fn range_bounds(&self, at: DateTime<Utc>) -> (i64, i64) {
        let t = at.timestamp();
        let w = self.window.as_secs() as i64;
        (t - w, t + w)
    }

    /// Execute the range query and return the raw `[epoch_millis, price]` samples.
    fn query_range(&self, from: i64, to: i64) -> Result<Vec<[f64; 2]>, UpstreamError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("vs_currency", self.vs_currency.clone()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .map_err(|e| UpstreamError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(UpstreamError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .map_err(|e| UpstreamError::NetworkUnreachable(e.to_string()))?;
        parse_prices(&body)
    }
}

impl PriceSource for MarketDataClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn fetch_near(&self, at: DateTime<Utc>) -> Result<f64, FetchError> {
        let (from, to) = self.range_bounds(at);
        let samples = self.query_range(from, to)?;

        nearest_price(&samples, at.timestamp()).ok_or_else(|| FetchError::NoData {
            from: DateTime::from_timestamp(from, 0).unwrap_or(at),
            to: DateTime::from_timestamp(to, 0).unwrap_or(at),
        })
    }
}

/// Decode a range response body. A missing `prices` field counts as empty.
fn parse_prices(body: &str) -> Result<Vec<[f64; 2]>, UpstreamError> {
    let resp: RangeResponse = serde_json::from_str(body)
        .map_err(|e| UpstreamError::ResponseFormatChanged(format!("unparseable body: {e}")))?;
    let samples = resp.prices.unwrap_or_default();

    if let Some([ms, price]) = samples
        .iter()
        .find(|[ms, price]| !ms.is_finite() || !price.is_finite())
    {
        return Err(UpstreamError::ResponseFormatChanged(format!(
            "non-finite sample [{ms}, {price}]"
        )));
    }
    Ok(samples)
}

/// Price of the sample closest to `target_secs`; the first one wins a tie.
pub fn nearest_price(samples: &[[f64; 2]], target_secs: i64) -> Option<f64> {
    let target = target_secs as f64;
    let mut best: Option<(f64, f64)> = None;

    for &[ms, price] in samples {
        let distance = (ms / 1000.0 - target).abs();
        match best {
            Some((best_distance, _)) if best_distance <= distance => {}
            _ => best = Some((distance, price)),
        }
    }
    best.map(|(_, price)| price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const T: i64 = 1_704_124_800; // 2024-01-01T16:00:00Z

    fn client() -> MarketDataClient {
        MarketDataClient::new(
            DEFAULT_BASE_URL,
            "usd",
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn picks_closest_sample() {
        let samples = [
            [((T - 500) * 1000) as f64, 1.0],
            [((T + 50) * 1000) as f64, 2.0],
            [((T + 9000) * 1000) as f64, 3.0],
        ];
        assert_eq!(nearest_price(&samples, T), Some(2.0));
    }

    #[test]
    fn tie_goes_to_first_sample() {
        let samples = [
            [((T - 60) * 1000) as f64, 10.0],
            [((T + 60) * 1000) as f64, 20.0],
        ];
        assert_eq!(nearest_price(&samples, T), Some(10.0));
    }

    #[test]
    fn no_samples_no_price() {
        assert_eq!(nearest_price(&[], T), None);
    }

    #[test]
    fn range_spans_one_hour_each_side() {
        let at = Utc.timestamp_opt(T, 0).unwrap();
        assert_eq!(client().range_bounds(at), (T - 3600, T + 3600));
    }

    #[test]
    fn parses_market_chart_body() {
        let body = r#"{
            "prices": [[1704121200000, 42150.25], [1704124800000, 42210.5]],
            "market_caps": [[1704121200000, 825000000000.0]],
            "total_volumes": []
        }"#;
        let samples = parse_prices(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(nearest_price(&samples, T), Some(42210.5));
    }

    #[test]
    fn missing_or_empty_prices_parse_as_empty() {
        assert!(parse_prices(r#"{"prices": []}"#).unwrap().is_empty());
        assert!(parse_prices(r#"{"market_caps": []}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_upstream_error() {
        let err = parse_prices("<html>Too Many Requests</html>").unwrap_err();
        assert!(matches!(err, UpstreamError::ResponseFormatChanged(_)));

        let err = parse_prices(r#"{"prices": [[1704124800000, "x"]]}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::ResponseFormatChanged(_)));
    }

    #[test]
    fn unreachable_host_is_upstream_not_gap() {
        let client = MarketDataClient::new(
            "http://127.0.0.1:9/range",
            "usd",
            Duration::from_secs(3600),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client
            .fetch_near(Utc.timestamp_opt(T, 0).unwrap())
            .unwrap_err();
        assert!(!err.is_gap());
    }
}
