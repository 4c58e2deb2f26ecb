//! Forecast window construction from the growth feed

use crate::error::{IrrigationError, Result};
use crate::growth::FeedRow;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One day of the decision window, with ETc accumulated from today
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub etc_mm: f64,
    pub rain_mm: f64,
    pub cumulative_etc_mm: f64,
}

/// Rows dated `today..=today + horizon_days`, ascending, with missing ETc and
/// rain read as zero. Fewer than `min_days` rows is an error, never an empty
/// forecast.
pub fn build_forecast(
    rows: &[FeedRow],
    today: NaiveDate,
    horizon_days: u32,
    min_days: u32,
) -> Result<Vec<ForecastDay>> {
    let last = today + Duration::days(i64::from(horizon_days));
    let mut window: Vec<&FeedRow> = rows
        .iter()
        .filter(|row| row.date >= today && row.date <= last)
        .collect();
    window.sort_by_key(|row| row.date);

    if window.len() < min_days as usize {
        return Err(IrrigationError::InsufficientForecast {
            available: window.len(),
            required: min_days as usize,
        });
    }

    let mut cumulative = 0.0;
    Ok(window
        .into_iter()
        .map(|row| {
            let etc_mm = row.etc_mm.filter(|v| v.is_finite()).unwrap_or(0.0);
            let rain_mm = row.rain_mm.filter(|v| v.is_finite()).unwrap_or(0.0);
            cumulative += etc_mm;
            ForecastDay {
                date: row.date,
                etc_mm,
                rain_mm,
                cumulative_etc_mm: cumulative,
            }
        })
        .collect())
}
