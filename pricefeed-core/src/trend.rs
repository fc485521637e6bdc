//! Linear trend over the stored price series.
//!
//! The only feature is the number of whole days elapsed since the first
//! observation; the model is an ordinary least-squares line through
//! (days, price). Quality is reported in-sample as MSE and R².

use crate::domain::PriceObservation;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrendError {
    #[error("need at least 2 observations to fit a trend, got {0}")]
    TooFewObservations(usize),

    #[error("all observations fall on the same day; slope is undefined")]
    DegenerateSpan,

    #[error("current price is zero; percent change is undefined")]
    ZeroCurrentPrice,

    #[error("projecting {0} days ahead leaves the representable date range")]
    HorizonOutOfRange(i64),
}

/// Fitted line `price = intercept + slope * days_since_start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendModel {
    pub origin: DateTime<Utc>,
    pub intercept: f64,
    /// USD per day.
    pub slope: f64,
    pub mse: f64,
    pub r_squared: f64,
    pub observations: usize,
}

/// A projected price some days past the end of the series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Projection {
    pub current_time: DateTime<Utc>,
    pub current_price: f64,
    pub target_time: DateTime<Utc>,
    pub predicted_price: f64,
    pub percent_change: f64,
}

/// Whole days between `origin` and `at`, truncated toward zero.
pub fn days_since(origin: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - origin).num_days()
}

impl TrendModel {
    /// Fit over a series sorted ascending by timestamp.
    pub fn fit(series: &[PriceObservation]) -> Result<Self, TrendError> {
        if series.len() < 2 {
            return Err(TrendError::TooFewObservations(series.len()));
        }
        let origin = series[0].timestamp;
        let n = series.len() as f64;

        let xs: Vec<f64> = series
            .iter()
            .map(|o| days_since(origin, o.timestamp) as f64)
            .collect();
        let ys: Vec<f64> = series.iter().map(|o| o.price).collect();

        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        if sxx == 0.0 {
            return Err(TrendError::DegenerateSpan);
        }
        let sxy: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_res: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();

        let r_squared = if ss_tot == 0.0 {
            // Constant prices: a perfect fit scores 1, anything else 0.
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Ok(Self {
            origin,
            intercept,
            slope,
            mse: ss_res / n,
            r_squared,
            observations: series.len(),
        })
    }

    pub fn predict_days(&self, days_since_start: f64) -> f64 {
        self.intercept + self.slope * days_since_start
    }

    pub fn predict_at(&self, at: DateTime<Utc>) -> f64 {
        self.predict_days(days_since(self.origin, at) as f64)
    }
}

/// Fit the series and project `days_ahead` days past its last observation.
pub fn project(
    series: &[PriceObservation],
    days_ahead: i64,
) -> Result<(TrendModel, Projection), TrendError> {
    let model = TrendModel::fit(series)?;
    let last = series[series.len() - 1];
    if last.price == 0.0 {
        return Err(TrendError::ZeroCurrentPrice);
    }

    let target_time = TimeDelta::try_days(days_ahead)
        .and_then(|ahead| last.timestamp.checked_add_signed(ahead))
        .ok_or(TrendError::HorizonOutOfRange(days_ahead))?;
    let predicted_price = model.predict_at(target_time);

    Ok((
        model,
        Projection {
            current_time: last.timestamp,
            current_price: last.price,
            target_time,
            predicted_price,
            percent_change: (predicted_price - last.price) / last.price * 100.0,
        },
    ))
}
