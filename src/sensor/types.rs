//! Sensor API data types
//!
//! Wire payloads are loosely typed (numbers sometimes arrive as strings), so
//! parsing goes through `serde_json::Value` and lands in these strict types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Depths the history plausibility filter checks
pub const HISTORY_DEPTHS_CM: [u32; 3] = [10, 20, 30];

/// One day of depth-tagged humidity readings from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    pub device_id: String,
    pub date: NaiveDate,
    /// depth (cm) -> volumetric humidity (%)
    pub readings: BTreeMap<u32, f64>,
}

impl SoilSample {
    pub fn humidity_at(&self, depth_cm: u32) -> Option<f64> {
        self.readings.get(&depth_cm).copied()
    }
}

/// Daily-average history for one device, date ordered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumidityTable {
    pub samples: Vec<SoilSample>,
}

impl HumidityTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Values of one depth column, skipping rows without that depth
    pub fn column(&self, depth_cm: u32) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|sample| sample.humidity_at(depth_cm))
            .collect()
    }
}

/// Where an instantaneous humidity figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Sensor,
    Caller,
    Default,
}

/// Result of the latest-reading endpoint; never an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReading {
    value: f64,
    source: ReadingSource,
    depth_cm: Option<u32>,
    measured_at: Option<DateTime<Utc>>,
}

impl LatestReading {
    pub fn from_sensor(value: f64, depth_cm: u32, measured_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            source: ReadingSource::Sensor,
            depth_cm: Some(depth_cm),
            measured_at,
        }
    }

    pub fn fallback(default_value: f64) -> Self {
        Self {
            value: default_value,
            source: ReadingSource::Default,
            depth_cm: None,
            measured_at: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_real(&self) -> bool {
        self.source == ReadingSource::Sensor
    }

    pub fn source(&self) -> ReadingSource {
        self.source
    }

    pub fn depth_cm(&self) -> Option<u32> {
        self.depth_cm
    }

    pub fn measured_at(&self) -> Option<DateTime<Utc>> {
        self.measured_at
    }
}

/// Numeric wire value that may be a JSON number or a numeric string
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// `soilHumidity{N}Value` -> `N`
pub fn humidity_key_depth(key: &str) -> Option<u32> {
    key.strip_prefix("soilHumidity")?
        .strip_suffix("Value")?
        .parse()
        .ok()
}

pub fn humidity_key(depth_cm: u32) -> String {
    format!("soilHumidity{depth_cm}Value")
}

/// Leading `YYYY-MM-DD` of a `dt` field (time suffix ignored)
pub fn parse_day(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// `msgTimeStr` epoch milliseconds
pub fn parse_epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = parse_number(value)?;
    DateTime::from_timestamp_millis(millis as i64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
