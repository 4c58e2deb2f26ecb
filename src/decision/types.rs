//! Decision output contract

use crate::config::DecisionConfig;
use crate::decision::engine::{DecisionEvaluation, DecisionInputs};
use crate::growth::GrowthCoefficients;
use crate::sensor::types::round2;
use crate::sensor::ReadingSource;
use crate::soil::{ParameterSource, ResolvedSoilState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Soil figures behind a decision, in millimetres and percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilData {
    pub current_humidity: f64,
    pub humidity_source: ReadingSource,
    pub root_depth_coefficient: f64,
    pub growth_stage_coefficient: f64,
    pub growth_stage: Option<String>,
    pub soil_depth: f64,
    /// SAT - PWP
    pub storage_potential: f64,
    /// FC - PWP
    pub effective_storage: f64,
    /// max(0, min(deficit to FC, FC - PWP))
    pub available_storage: f64,
    pub sat: f64,
    pub fc: f64,
    pub pwp: f64,
    pub sat_percent: f64,
    pub fc_percent: f64,
    pub pwp_percent: f64,
    pub is_real_data: bool,
    pub parameter_source: ParameterSource,
}

impl SoilData {
    pub fn from_state(
        inputs: &DecisionInputs,
        state: &ResolvedSoilState,
        coefficients: &GrowthCoefficients,
    ) -> Self {
        let sat = inputs.sat_mm();
        let fc = inputs.fc_mm();
        let pwp = inputs.pwp_mm();
        let available_storage = inputs.deficit_to_fc_mm().min(fc - pwp).max(0.0);

        Self {
            current_humidity: round2(inputs.real_humidity),
            humidity_source: state.real_humidity_source,
            root_depth_coefficient: coefficients.root_depth_coefficient,
            growth_stage_coefficient: coefficients.growth_stage_coefficient,
            growth_stage: coefficients.stage.clone(),
            soil_depth: inputs.soil_depth_cm,
            storage_potential: round2(sat - pwp),
            effective_storage: round2(fc - pwp),
            available_storage: round2(available_storage),
            sat: round2(sat),
            fc: round2(fc),
            pwp: round2(pwp),
            sat_percent: round2(inputs.sat_percent),
            fc_percent: round2(inputs.fc_percent),
            pwp_percent: round2(inputs.pwp_percent),
            is_real_data: state.is_real_data,
            parameter_source: state.parameters.source,
        }
    }
}

/// Thresholds and intermediate figures for auditing a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMeta {
    pub outcome: String,
    pub irrigation_threshold: f64,
    pub min_effective_irrigation: f64,
    pub max_single_irrigation: f64,
    pub rain_forecast_days: u32,
    pub decision_horizon_days: u32,
    pub min_rain_amount: f64,
    pub etc_horizon_mm: f64,
    pub available_to_pwp_mm: f64,
    pub deficit_to_fc_mm: f64,
    pub first_rain_day: Option<NaiveDate>,
    pub first_rain_amount: Option<f64>,
    pub forecast_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationDecision {
    pub date: NaiveDate,
    pub field_id: String,
    pub device_id: String,
    pub message: String,
    /// Quantized amount, mm
    pub irrigation_value: f64,
    pub soil_data: SoilData,
    pub meta: DecisionMeta,
}

impl IrrigationDecision {
    pub fn should_irrigate(&self) -> bool {
        self.irrigation_value > 0.0
    }
}

/// Resolved soil state of a field without a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSnapshot {
    pub field_id: String,
    pub device_id: String,
    pub hour_bucket: String,
    pub history_rows: usize,
    pub available_to_pwp_mm: f64,
    pub deficit_to_fc_mm: f64,
    pub soil_data: SoilData,
}

pub(crate) fn build_meta(
    evaluation: &DecisionEvaluation,
    config: &DecisionConfig,
    forecast_days: usize,
) -> DecisionMeta {
    DecisionMeta {
        outcome: evaluation.outcome.kind().to_string(),
        irrigation_threshold: (evaluation.effective_threshold * 1000.0).round() / 1000.0,
        min_effective_irrigation: round2(config.min_effective_irrigation),
        max_single_irrigation: round2(config.max_single_irrigation),
        rain_forecast_days: config.rain_forecast_days,
        decision_horizon_days: config.decision_horizon_days,
        min_rain_amount: round2(config.min_rain_amount),
        etc_horizon_mm: round2(evaluation.etc_horizon_mm),
        available_to_pwp_mm: round2(evaluation.available_to_pwp_mm),
        deficit_to_fc_mm: round2(evaluation.deficit_to_fc_mm),
        first_rain_day: evaluation.first_rain.as_ref().map(|day| day.date),
        first_rain_amount: evaluation.first_rain.as_ref().map(|day| round2(day.rain_mm)),
        forecast_days,
    }
}
