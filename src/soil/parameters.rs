//! Soil parameter sets and the strategies that produce them
//!
//! Each strategy proposes at most one `SoilParameterSet`; the resolver walks
//! them in priority order and keeps the first one that passes validation.

use crate::config::{FieldConfig, IrrigationConfig, SoilConfig, StatisticalBounds};
use crate::sensor::types::round2;
use crate::sensor::SoilApiClient;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tier that produced a parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Manual,
    Statistical,
    Default,
}

impl fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterSource::Manual => "manual",
            ParameterSource::Statistical => "statistical",
            ParameterSource::Default => "default",
        };
        f.write_str(label)
    }
}

/// Saturation, field capacity and wilting point (volumetric %)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilParameterSet {
    pub sat_percent: f64,
    pub fc_percent: f64,
    pub pwp_percent: f64,
    pub source: ParameterSource,
}

impl SoilParameterSet {
    pub fn new(sat_percent: f64, fc_percent: f64, pwp_percent: f64, source: ParameterSource) -> Self {
        Self {
            sat_percent,
            fc_percent,
            pwp_percent,
            source,
        }
    }

    pub fn defaults(soil: &SoilConfig) -> Self {
        Self::new(
            soil.default_sat,
            soil.default_fc,
            soil.default_pwp,
            ParameterSource::Default,
        )
    }

    /// `PWP < FC < SAT`, all finite
    pub fn is_consistent(&self) -> bool {
        let finite = self.sat_percent.is_finite()
            && self.fc_percent.is_finite()
            && self.pwp_percent.is_finite();
        finite && self.pwp_percent < self.fc_percent && self.fc_percent < self.sat_percent
    }

    pub fn within_bounds(&self, bounds: &StatisticalBounds) -> bool {
        (bounds.pwp_min..=bounds.pwp_max).contains(&self.pwp_percent)
            && (bounds.sat_min..=bounds.sat_max).contains(&self.sat_percent)
    }
}

/// Inputs shared by every strategy for one resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub field_id: &'a str,
    pub device_id: &'a str,
    pub field: Option<&'a FieldConfig>,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyOutcome {
    pub candidate: Option<SoilParameterSet>,
    /// History rows fetched while trying, whether or not a candidate resulted
    pub history_rows: usize,
}

impl StrategyOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn found(candidate: SoilParameterSet) -> Self {
        Self {
            candidate: Some(candidate),
            history_rows: 0,
        }
    }
}

#[async_trait]
pub trait ParameterStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    async fn propose(&self, context: &ResolutionContext<'_>) -> StrategyOutcome;
}

/// Field-level manual override
#[derive(Debug, Default)]
pub struct ManualOverrideStrategy;

#[async_trait]
impl ParameterStrategy for ManualOverrideStrategy {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn propose(&self, context: &ResolutionContext<'_>) -> StrategyOutcome {
        match context.field.and_then(FieldConfig::manual_parameters) {
            Some((sat, fc, pwp)) => {
                debug!(field_id = context.field_id, sat, fc, pwp, "Using manual soil parameters");
                StrategyOutcome::found(SoilParameterSet::new(sat, fc, pwp, ParameterSource::Manual))
            }
            None => StrategyOutcome::none(),
        }
    }
}

/// SAT/PWP as max/min and FC as mean of the depth column of sensor history
#[derive(Debug)]
pub struct StatisticalStrategy {
    config: Arc<IrrigationConfig>,
    client: Arc<SoilApiClient>,
}

impl StatisticalStrategy {
    pub fn new(config: Arc<IrrigationConfig>, client: Arc<SoilApiClient>) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl ParameterStrategy for StatisticalStrategy {
    fn name(&self) -> &'static str {
        "statistical"
    }

    async fn propose(&self, context: &ResolutionContext<'_>) -> StrategyOutcome {
        let depth = self.config.soil.depth_cm;

        let (start, end) = self
            .config
            .sat_pwp_period(context.field_id)
            .bounds(context.today);
        let extremes_table = self
            .client
            .fetch_daily_average(context.device_id, start, end)
            .await;
        let extremes = extremes_table.column(depth);
        let mut history_rows = extremes_table.len();

        let (Some(sat), Some(pwp)) = (max(&extremes), min(&extremes)) else {
            debug!(
                field_id = context.field_id,
                device_id = context.device_id,
                "No SAT/PWP history, skipping statistical estimate"
            );
            return StrategyOutcome {
                candidate: None,
                history_rows,
            };
        };

        let (fc_start, fc_end) = self.config.fc_period(context.field_id).bounds(context.today);
        let fc_table = self
            .client
            .fetch_daily_average(context.device_id, fc_start, fc_end)
            .await;
        history_rows += fc_table.len();

        let Some(fc) = mean(&fc_table.column(depth)) else {
            warn!(
                field_id = context.field_id,
                device_id = context.device_id,
                fc_start = %fc_start,
                fc_end = %fc_end,
                "No FC history, discarding statistical estimate"
            );
            return StrategyOutcome {
                candidate: None,
                history_rows,
            };
        };

        let candidate = SoilParameterSet::new(
            round2(sat),
            round2(fc),
            round2(pwp),
            ParameterSource::Statistical,
        );
        debug!(
            field_id = context.field_id,
            sat = candidate.sat_percent,
            fc = candidate.fc_percent,
            pwp = candidate.pwp_percent,
            history_rows,
            "Statistical soil parameters"
        );

        StrategyOutcome {
            candidate: Some(candidate),
            history_rows,
        }
    }
}

/// Configured constants; always proposes
#[derive(Debug)]
pub struct DefaultStrategy {
    defaults: SoilParameterSet,
}

impl DefaultStrategy {
    pub fn new(soil: &SoilConfig) -> Self {
        Self {
            defaults: SoilParameterSet::defaults(soil),
        }
    }
}

#[async_trait]
impl ParameterStrategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn propose(&self, _context: &ResolutionContext<'_>) -> StrategyOutcome {
        StrategyOutcome::found(self.defaults)
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
