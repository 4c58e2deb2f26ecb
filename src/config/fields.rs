//! Field registry
//!
//! Each irrigated field maps to one soil sensor device and may carry a manual
//! soil-parameter override or its own history windows for statistics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Manually surveyed soil moisture levels (volumetric %)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualSoilParams {
    pub sat: Option<f64>,
    pub fc: Option<f64>,
    pub pwp: Option<f64>,
}

/// Date window for history statistics; an open end means "today"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPeriod {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl HistoryPeriod {
    pub fn new(start_date: NaiveDate, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// Concrete `(start, end)` bounds for a query issued on `today`
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (self.start_date, self.end_date.unwrap_or(today))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub field_id: String,
    pub device_id: String,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub crop_type: Option<String>,
    /// Area in mu
    #[serde(default)]
    pub area_mu: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub use_manual_soil_params: bool,
    #[serde(default)]
    pub soil_params: Option<ManualSoilParams>,
    #[serde(default)]
    pub sat_pwp_period: Option<HistoryPeriod>,
    #[serde(default)]
    pub fc_period: Option<HistoryPeriod>,
}

impl FieldConfig {
    pub fn new(field_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            device_id: device_id.into(),
            field_name: None,
            crop_type: None,
            area_mu: None,
            description: None,
            use_manual_soil_params: false,
            soil_params: None,
            sat_pwp_period: None,
            fc_period: None,
        }
    }

    /// Builder-style helper used by tests and the CLI
    pub fn with_manual_params(mut self, sat: f64, fc: f64, pwp: f64) -> Self {
        self.use_manual_soil_params = true;
        self.soil_params = Some(ManualSoilParams {
            sat: Some(sat),
            fc: Some(fc),
            pwp: Some(pwp),
        });
        self
    }

    /// `(sat, fc, pwp)` when the override is switched on and complete
    pub fn manual_parameters(&self) -> Option<(f64, f64, f64)> {
        if !self.use_manual_soil_params {
            return None;
        }
        let params = self.soil_params.as_ref()?;
        match (params.sat, params.fc, params.pwp) {
            (Some(sat), Some(fc), Some(pwp))
                if sat.is_finite() && fc.is_finite() && pwp.is_finite() =>
            {
                Some((sat, fc, pwp))
            }
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.field_name.as_deref().unwrap_or(&self.field_id)
    }
}
