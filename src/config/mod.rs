//! # Irrigation Configuration System
//!
//! Typed, layered configuration for the irrigation core. Every value has an
//! explicit default; the whole tree is validated once at startup so the
//! decision path never has to second-guess a setting.
//!
//! ## Layering
//!
//! - `base.toml` in the configuration directory (required)
//! - `<environment>.toml` next to it (optional)
//! - `IRRIGATION__SECTION__KEY` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use irrigation_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let depth = manager.config().soil.depth_cm;
//! let threshold = manager.config().decision.irrigation_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fields;
pub mod loader;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub use crate::resilience::config::{BreakerScope, CircuitBreakerConfig, RetryConfig};
pub use error::{ConfigResult, ConfigurationError};
pub use fields::{FieldConfig, HistoryPeriod, ManualSoilParams};
pub use loader::ConfigManager;

use crate::error::IrrigationError;

/// Root configuration tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrrigationConfig {
    pub sensor_api: SensorApiConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub soil: SoilConfig,
    pub decision: DecisionConfig,
    pub growth: GrowthConfig,
    pub cache: CacheConfig,
    pub fields: Vec<FieldConfig>,
    pub default_field_id: Option<String>,
}

/// Soil sensor HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorApiConfig {
    pub base_url: String,
    /// Sent as the `token` form field and the `Authorization` header
    pub api_key: String,
    pub daily_average_path: String,
    pub latest_path: String,
    pub user_agent: String,
}

impl Default for SensorApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iland.zoomlion.com/open-sharing-platform/zlapi/".to_string(),
            api_key: String::new(),
            daily_average_path: "soilTestingApi/v1/getDailyAvg".to_string(),
            latest_path: "irrigationApi/v2/getSoilLast".to_string(),
            user_agent: format!("irrigation-core-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Statistical estimates outside these bounds are discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalBounds {
    pub pwp_min: f64,
    pub pwp_max: f64,
    pub sat_min: f64,
    pub sat_max: f64,
}

impl Default for StatisticalBounds {
    fn default() -> Self {
        Self {
            pwp_min: 5.0,
            pwp_max: 25.0,
            sat_min: 25.0,
            sat_max: 45.0,
        }
    }
}

/// Global history windows used by fields without their own periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryWindows {
    pub sat_pwp_period: HistoryPeriod,
    pub fc_period: HistoryPeriod,
}

impl Default for HistoryWindows {
    fn default() -> Self {
        Self {
            sat_pwp_period: HistoryPeriod::new(ymd(2025, 8, 1), None),
            fc_period: HistoryPeriod::new(ymd(2025, 11, 16), Some(ymd(2025, 11, 17))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilConfig {
    /// Depth of the managed soil layer; also selects the sensor column
    pub depth_cm: u32,
    pub default_sat: f64,
    pub default_fc: f64,
    pub default_pwp: f64,
    pub default_real_humidity: f64,
    pub humidity_min_range: f64,
    pub humidity_max_range: f64,
    /// History rows with any depth below this are dropped
    pub min_plausible_humidity: f64,
    pub statistical_bounds: StatisticalBounds,
    pub history: HistoryWindows,
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            depth_cm: 30,
            default_sat: 35.5,
            default_fc: 25.0,
            default_pwp: 15.2,
            default_real_humidity: 25.0,
            humidity_min_range: 0.0,
            humidity_max_range: 100.0,
            min_plausible_humidity: 10.0,
            statistical_bounds: StatisticalBounds::default(),
            history: HistoryWindows::default(),
        }
    }
}

impl SoilConfig {
    pub fn clamp_humidity(&self, value: f64) -> f64 {
        value.clamp(self.humidity_min_range, self.humidity_max_range)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub irrigation_threshold: f64,
    pub min_effective_irrigation: f64,
    pub max_single_irrigation: f64,
    pub irrigation_levels: Vec<f64>,
    pub min_rain_amount: f64,
    /// Rain within this many days (counted from today) can defer irrigation
    pub rain_forecast_days: u32,
    /// Days the soil water has to last; selects the ETc day and late-rain cutoff
    pub decision_horizon_days: u32,
    pub forecast_horizon_days: u32,
    pub min_forecast_data_days: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            irrigation_threshold: 0.6,
            min_effective_irrigation: 5.0,
            max_single_irrigation: 30.0,
            irrigation_levels: vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0],
            min_rain_amount: 5.0,
            rain_forecast_days: 3,
            decision_horizon_days: 3,
            forecast_horizon_days: 15,
            min_forecast_data_days: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Simulator daily output (`.out`)
    pub feed_path: PathBuf,
    pub header_skip_lines: usize,
    /// Stage interval CSV
    pub stage_table_path: PathBuf,
    pub root_depth_threshold_m: f64,
    pub stage_coefficients: BTreeMap<String, f64>,
    /// Simulator command run at most once per day before deciding
    pub model_command: Option<String>,
    pub model_args: Vec<String>,
    pub model_working_dir: Option<PathBuf>,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::from("data/model_output/wheat.out"),
            header_skip_lines: 10,
            stage_table_path: PathBuf::from("data/model_output/growth_stages.csv"),
            root_depth_threshold_m: 0.3,
            stage_coefficients: default_stage_coefficients(),
            model_command: None,
            model_args: Vec::new(),
            model_working_dir: None,
        }
    }
}

/// Six winter-wheat phenological stages and their water-demand weights
pub fn default_stage_coefficients() -> BTreeMap<String, f64> {
    [
        ("sowing-emergence", 0.6),
        ("emergence-tillering", 0.7),
        ("tillering-overwintering", 0.8),
        ("greening-jointing", 0.9),
        ("jointing-heading", 1.0),
        ("heading-maturity", 0.9),
    ]
    .into_iter()
    .map(|(stage, coefficient)| (stage.to_string(), coefficient))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl IrrigationConfig {
    /// Look up a field by id; the first match wins
    pub fn field(&self, field_id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.field_id == field_id)
    }

    pub fn device_for_field(&self, field_id: &str) -> Result<&str, IrrigationError> {
        self.field(field_id)
            .map(|field| field.device_id.as_str())
            .ok_or_else(|| IrrigationError::UnknownField(field_id.to_string()))
    }

    /// SAT/PWP history window for a field
    pub fn sat_pwp_period(&self, field_id: &str) -> &HistoryPeriod {
        self.field(field_id)
            .and_then(|field| field.sat_pwp_period.as_ref())
            .unwrap_or(&self.soil.history.sat_pwp_period)
    }

    /// FC history window for a field
    pub fn fc_period(&self, field_id: &str) -> &HistoryPeriod {
        self.field(field_id)
            .and_then(|field| field.fc_period.as_ref())
            .unwrap_or(&self.soil.history.fc_period)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sensor_api.base_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "sensor_api.base_url",
                "sensor API configuration",
            ));
        }

        if let Err(e) = reqwest::Url::parse(&self.sensor_api.base_url) {
            return Err(ConfigurationError::invalid_value(
                "sensor_api.base_url",
                &self.sensor_api.base_url,
                format!("not a valid URL: {e}"),
            ));
        }

        if self.sensor_api.api_key.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "sensor_api.api_key",
                "sensor API configuration",
            ));
        }

        self.retry
            .validate()
            .map_err(|e| ConfigurationError::validation_error(format!("retry: {e}")))?;

        self.circuit_breaker
            .validate()
            .map_err(|e| ConfigurationError::validation_error(format!("circuit_breaker: {e}")))?;

        let soil = &self.soil;
        if soil.depth_cm == 0 {
            return Err(ConfigurationError::invalid_value(
                "soil.depth_cm",
                "0",
                "soil depth must be greater than 0",
            ));
        }

        if !(soil.default_pwp < soil.default_fc && soil.default_fc < soil.default_sat) {
            return Err(ConfigurationError::validation_error(format!(
                "default soil parameters must satisfy PWP < FC < SAT (got pwp={}, fc={}, sat={})",
                soil.default_pwp, soil.default_fc, soil.default_sat
            )));
        }

        if soil.humidity_min_range >= soil.humidity_max_range {
            return Err(ConfigurationError::invalid_value(
                "soil.humidity_min_range",
                soil.humidity_min_range,
                "must be below soil.humidity_max_range",
            ));
        }

        let decision = &self.decision;
        if decision.irrigation_levels.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "decision.irrigation_levels",
                "decision configuration",
            ));
        }

        if decision.irrigation_levels.iter().any(|level| *level < 0.0)
            || decision
                .irrigation_levels
                .windows(2)
                .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigurationError::invalid_value(
                "decision.irrigation_levels",
                format!("{:?}", decision.irrigation_levels),
                "levels must be non-negative and strictly ascending",
            ));
        }

        if decision.min_effective_irrigation >= decision.max_single_irrigation {
            return Err(ConfigurationError::invalid_value(
                "decision.min_effective_irrigation",
                decision.min_effective_irrigation,
                "must be below decision.max_single_irrigation",
            ));
        }

        if decision.irrigation_threshold <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "decision.irrigation_threshold",
                decision.irrigation_threshold,
                "threshold must be greater than 0",
            ));
        }

        if decision.decision_horizon_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "decision.decision_horizon_days",
                "0",
                "horizon must be at least 1 day",
            ));
        }

        if decision.min_forecast_data_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "decision.min_forecast_data_days",
                "0",
                "at least 1 forecast day is required",
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.field_id.trim().is_empty() || field.device_id.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "fields[].field_id / fields[].device_id",
                    "field registry",
                ));
            }
            if !seen.insert(field.field_id.as_str()) {
                return Err(ConfigurationError::invalid_value(
                    "fields[].field_id",
                    &field.field_id,
                    "field ids must be unique",
                ));
            }
        }

        if let Some(default_field) = &self.default_field_id {
            if !self.fields.is_empty() && self.field(default_field).is_none() {
                return Err(ConfigurationError::invalid_value(
                    "default_field_id",
                    default_field,
                    "not present in the field registry",
                ));
            }
        }

        Ok(())
    }

    /// Non-fatal issues worth logging at startup
    pub fn validation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.decision.rain_forecast_days != self.decision.decision_horizon_days {
            warnings.push(format!(
                "decision.rain_forecast_days ({}) differs from decision.decision_horizon_days ({}); \
                 rain deferral and the late-rain cutoff use different windows",
                self.decision.rain_forecast_days, self.decision.decision_horizon_days
            ));
        }

        if self.decision.forecast_horizon_days < self.decision.min_forecast_data_days {
            warnings.push(format!(
                "decision.forecast_horizon_days ({}) is shorter than decision.min_forecast_data_days ({}); \
                 every decision will fail for lack of forecast data",
                self.decision.forecast_horizon_days, self.decision.min_forecast_data_days
            ));
        }

        for field in &self.fields {
            if field.use_manual_soil_params {
                match field.manual_parameters() {
                    Some((sat, fc, pwp)) if !(pwp < fc && fc < sat) => warnings.push(format!(
                        "field {}: manual soil parameters violate PWP < FC < SAT \
                         (sat={sat}, fc={fc}, pwp={pwp}); statistics will be used instead",
                        field.field_id
                    )),
                    None => warnings.push(format!(
                        "field {}: use_manual_soil_params is set but sat/fc/pwp are incomplete",
                        field.field_id
                    )),
                    _ => {}
                }
            }
        }

        warnings
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}
