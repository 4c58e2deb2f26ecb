//! # Irrigation Decision Engine
//!
//! Pure decision rule: given the soil state (percentages), the growth
//! coefficients and a forecast window, choose an irrigation amount. Rules are
//! evaluated in a fixed order and the first that applies wins:
//!
//! 1. critical: no water left above the wilting point
//! 2. sufficient: the soil covers ETc over the decision horizon
//! 3. rain in the forecast: defer, irrigate ahead of late rain, or top up
//!    ahead of light rain
//! 4. no rain: irrigate the shortfall if it is worth a valve cycle
//!
//! Positive amounts are capped at the single-irrigation maximum and
//! quantized onto the configured level ladder.

use crate::config::DecisionConfig;
use crate::decision::forecast::ForecastDay;
use crate::decision::quantize::quantize;
use crate::error::{IrrigationError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Soil and crop figures a decision is computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInputs {
    pub today: NaiveDate,
    pub real_humidity: f64,
    pub sat_percent: f64,
    pub fc_percent: f64,
    pub pwp_percent: f64,
    pub root_depth_coefficient: f64,
    pub growth_stage_coefficient: f64,
    pub soil_depth_cm: f64,
}

impl DecisionInputs {
    /// Millimetres of water per volumetric percent over the managed layer
    pub fn conversion_factor(&self) -> f64 {
        self.soil_depth_cm / 10.0 * self.root_depth_coefficient * self.growth_stage_coefficient
    }

    pub fn sat_mm(&self) -> f64 {
        self.sat_percent * self.conversion_factor()
    }

    pub fn fc_mm(&self) -> f64 {
        self.fc_percent * self.conversion_factor()
    }

    pub fn pwp_mm(&self) -> f64 {
        self.pwp_percent * self.conversion_factor()
    }

    /// Water above the wilting point
    pub fn available_to_pwp_mm(&self) -> f64 {
        (self.real_humidity - self.pwp_percent) * self.conversion_factor()
    }

    /// Distance below field capacity; negative when above it
    pub fn deficit_to_fc_mm(&self) -> f64 {
        (self.fc_percent - self.real_humidity) * self.conversion_factor()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Critical { amount_mm: f64 },
    Sufficient,
    RainDeferred { days_to_rain: i64, rain_mm: f64 },
    IrrigateBeforeLateRain { amount_mm: f64 },
    IrrigateDespiteLightRain { amount_mm: f64 },
    RainExpected,
    NoRainIrrigate { amount_mm: f64 },
    WaterLastsHorizon,
    BelowMinimumEffective { candidate_mm: f64, minimum_mm: f64 },
}

impl DecisionOutcome {
    pub fn irrigation_mm(&self) -> f64 {
        match self {
            Self::Critical { amount_mm }
            | Self::IrrigateBeforeLateRain { amount_mm }
            | Self::IrrigateDespiteLightRain { amount_mm }
            | Self::NoRainIrrigate { amount_mm } => *amount_mm,
            _ => 0.0,
        }
    }

    pub fn should_irrigate(&self) -> bool {
        self.irrigation_mm() > 0.0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Critical { .. } => "critical",
            Self::Sufficient => "sufficient",
            Self::RainDeferred { .. } => "rain_deferred",
            Self::IrrigateBeforeLateRain { .. } => "irrigate_before_late_rain",
            Self::IrrigateDespiteLightRain { .. } => "irrigate_despite_light_rain",
            Self::RainExpected => "rain_expected",
            Self::NoRainIrrigate { .. } => "no_rain_irrigate",
            Self::WaterLastsHorizon => "water_lasts_horizon",
            Self::BelowMinimumEffective { .. } => "below_minimum_effective",
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical { amount_mm } => write!(
                f,
                "soil water at critical level, irrigate {amount_mm:.1}mm immediately"
            ),
            Self::Sufficient => write!(f, "water sufficient, no irrigation today"),
            Self::RainDeferred {
                days_to_rain,
                rain_mm,
            } => write!(
                f,
                "{rain_mm:.1}mm of rain expected within {days_to_rain} days, irrigation deferred"
            ),
            Self::IrrigateBeforeLateRain { amount_mm } => write!(
                f,
                "irrigate {amount_mm:.1}mm today, rain only expected after the decision horizon"
            ),
            Self::IrrigateDespiteLightRain { amount_mm } => write!(
                f,
                "irrigate {amount_mm:.1}mm today, expected rain is not enough to cover demand"
            ),
            Self::RainExpected => write!(f, "rain forecast, no irrigation today"),
            Self::NoRainIrrigate { amount_mm } => write!(
                f,
                "irrigate {amount_mm:.1}mm today, no rain in the forecast"
            ),
            Self::WaterLastsHorizon => write!(
                f,
                "soil water lasts through the decision horizon, no irrigation today"
            ),
            Self::BelowMinimumEffective { minimum_mm, .. } => write!(
                f,
                "required amount below the minimum effective irrigation ({minimum_mm:.1}mm), no irrigation today"
            ),
        }
    }
}

/// Outcome plus the intermediate figures it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvaluation {
    pub outcome: DecisionOutcome,
    pub available_to_pwp_mm: f64,
    pub deficit_to_fc_mm: f64,
    pub effective_threshold: f64,
    /// Cumulative ETc at the last day of the decision horizon
    pub etc_horizon_mm: f64,
    pub first_rain: Option<ForecastDay>,
}

#[derive(Debug, Clone)]
pub struct IrrigationDecisionEngine {
    config: DecisionConfig,
}

impl IrrigationDecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        inputs: &DecisionInputs,
        forecast: &[ForecastDay],
    ) -> Result<DecisionEvaluation> {
        if forecast.is_empty() {
            return Err(IrrigationError::InsufficientForecast {
                available: 0,
                required: self.config.min_forecast_data_days.max(1) as usize,
            });
        }

        let available = inputs.available_to_pwp_mm();
        let deficit = inputs.deficit_to_fc_mm();
        let effective_threshold = self.config.irrigation_threshold * inputs.growth_stage_coefficient;

        let horizon_index =
            (self.config.decision_horizon_days.max(1) as usize - 1).min(forecast.len() - 1);
        let etc_horizon = forecast[horizon_index].cumulative_etc_mm;
        let covered = available * effective_threshold;

        let first_rain = forecast.iter().find(|day| day.rain_mm > 0.0).cloned();

        let outcome = self.decide(
            inputs,
            forecast,
            available,
            deficit,
            etc_horizon,
            covered,
            first_rain.as_ref(),
        );

        debug!(
            outcome = outcome.kind(),
            available_to_pwp_mm = available,
            deficit_to_fc_mm = deficit,
            effective_threshold,
            etc_horizon_mm = etc_horizon,
            "Irrigation rule evaluated"
        );

        Ok(DecisionEvaluation {
            outcome,
            available_to_pwp_mm: available,
            deficit_to_fc_mm: deficit,
            effective_threshold,
            etc_horizon_mm: etc_horizon,
            first_rain,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn decide(
        &self,
        inputs: &DecisionInputs,
        forecast: &[ForecastDay],
        available: f64,
        deficit: f64,
        etc_horizon: f64,
        covered: f64,
        first_rain: Option<&ForecastDay>,
    ) -> DecisionOutcome {
        let max_single = self.config.max_single_irrigation;
        let min_effective = self.config.min_effective_irrigation;

        if available <= 0.0 {
            return DecisionOutcome::Critical {
                amount_mm: self.settle(deficit.min(max_single)),
            };
        }

        if etc_horizon <= covered {
            return DecisionOutcome::Sufficient;
        }

        if let Some(rain) = first_rain {
            let days_to_rain = (rain.date - inputs.today).num_days();

            if days_to_rain <= i64::from(self.config.rain_forecast_days)
                && rain.rain_mm >= self.config.min_rain_amount
            {
                return DecisionOutcome::RainDeferred {
                    days_to_rain,
                    rain_mm: rain.rain_mm,
                };
            }

            let last_horizon_day = i64::from(self.config.decision_horizon_days.max(1)) - 1;
            if days_to_rain > last_horizon_day {
                let candidate = etc_horizon - covered;
                if candidate > min_effective {
                    return DecisionOutcome::IrrigateBeforeLateRain {
                        amount_mm: self.settle(candidate.min(max_single)),
                    };
                }
                info!(
                    days_to_rain,
                    candidate_mm = candidate,
                    "No irrigation, late rain and small shortfall"
                );
                return DecisionOutcome::RainExpected;
            }

            let etc_to_rain = forecast
                .iter()
                .find(|day| day.date == rain.date)
                .map(|day| day.cumulative_etc_mm)
                .unwrap_or(rain.cumulative_etc_mm);
            let candidate = etc_to_rain - covered;
            if candidate > min_effective {
                return DecisionOutcome::IrrigateDespiteLightRain {
                    amount_mm: self.settle(candidate.min(max_single)),
                };
            }

            info!(
                days_to_rain,
                rain_mm = rain.rain_mm,
                candidate_mm = candidate,
                "No irrigation, rain forecast"
            );
            return DecisionOutcome::RainExpected;
        }

        let candidate = deficit.min(etc_horizon - covered).min(max_single);
        if candidate <= 0.0 {
            return DecisionOutcome::WaterLastsHorizon;
        }
        if candidate <= min_effective {
            return DecisionOutcome::BelowMinimumEffective {
                candidate_mm: candidate,
                minimum_mm: min_effective,
            };
        }
        DecisionOutcome::NoRainIrrigate {
            amount_mm: self.settle(candidate),
        }
    }

    fn settle(&self, amount: f64) -> f64 {
        quantize(amount, &self.config.irrigation_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
    }

    fn inputs(real: f64) -> DecisionInputs {
        DecisionInputs {
            today: today(),
            real_humidity: real,
            sat_percent: 35.5,
            fc_percent: 25.0,
            pwp_percent: 15.2,
            root_depth_coefficient: 1.0,
            growth_stage_coefficient: 1.0,
            soil_depth_cm: 30.0,
        }
    }

    fn forecast(days: &[(f64, f64)]) -> Vec<ForecastDay> {
        let mut cumulative = 0.0;
        days.iter()
            .enumerate()
            .map(|(i, (etc, rain))| {
                cumulative += etc;
                ForecastDay {
                    date: today() + Duration::days(i as i64),
                    etc_mm: *etc,
                    rain_mm: *rain,
                    cumulative_etc_mm: cumulative,
                }
            })
            .collect()
    }

    fn engine() -> IrrigationDecisionEngine {
        IrrigationDecisionEngine::new(DecisionConfig::default())
    }

    #[test]
    fn test_unit_conversion() {
        let inputs = inputs(25.8);
        assert!((inputs.conversion_factor() - 3.0).abs() < 1e-9);
        assert!((inputs.available_to_pwp_mm() - 31.8).abs() < 1e-9);
        assert!((inputs.deficit_to_fc_mm() + 2.4).abs() < 1e-9);
        assert!((inputs.sat_mm() - 106.5).abs() < 1e-9);
    }

    #[test]
    fn test_critical_at_wilting_point() {
        let evaluation = engine()
            .evaluate(&inputs(15.2), &forecast(&[(1.0, 0.0); 3]))
            .unwrap();
        // deficit (25.0 - 15.2) * 3 = 29.4mm, quantized up to 30
        assert_eq!(evaluation.outcome, DecisionOutcome::Critical { amount_mm: 30.0 });
    }

    #[test]
    fn test_short_forecast_uses_last_day() {
        // available 3mm * 0.6 = 1.8mm covered; only two days, etc 1 + 1
        let evaluation = engine()
            .evaluate(&inputs(16.2), &forecast(&[(1.0, 0.0), (1.0, 0.0)]))
            .unwrap();
        assert!((evaluation.etc_horizon_mm - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_forecast_is_an_error() {
        let result = engine().evaluate(&inputs(20.0), &[]);
        assert!(matches!(
            result,
            Err(IrrigationError::InsufficientForecast { available: 0, .. })
        ));
    }

    #[test]
    fn test_late_rain_irrigates_ahead() {
        // available (17.2 - 15.2) * 3 = 6mm, covered 3.6mm; etc3 = 15mm
        let evaluation = engine()
            .evaluate(
                &inputs(17.2),
                &forecast(&[(5.0, 0.0), (5.0, 0.0), (5.0, 0.0), (5.0, 0.0), (5.0, 12.0)]),
            )
            .unwrap();
        // 15 - 3.6 = 11.4 -> 15
        assert_eq!(
            evaluation.outcome,
            DecisionOutcome::IrrigateBeforeLateRain { amount_mm: 15.0 }
        );
    }

    #[test]
    fn test_no_rain_small_shortfall_is_below_minimum() {
        // available 6mm, covered 3.6mm; etc3 = 6mm -> shortfall 2.4mm
        let evaluation = engine()
            .evaluate(&inputs(17.2), &forecast(&[(2.0, 0.0); 3]))
            .unwrap();
        assert!(matches!(
            evaluation.outcome,
            DecisionOutcome::BelowMinimumEffective { .. }
        ));
        assert_eq!(evaluation.outcome.irrigation_mm(), 0.0);
    }

    #[test]
    fn test_no_rain_capped_by_deficit() {
        // real 24: available 26.4mm covered 15.84; deficit 3mm; etc3 = 30
        let evaluation = engine()
            .evaluate(&inputs(24.0), &forecast(&[(10.0, 0.0); 3]))
            .unwrap();
        assert!(matches!(
            evaluation.outcome,
            DecisionOutcome::BelowMinimumEffective { .. }
        ));

        // real 18: available 8.4mm covered 5.04; deficit 21mm; etc3 = 30
        let evaluation = engine()
            .evaluate(&inputs(18.0), &forecast(&[(10.0, 0.0); 3]))
            .unwrap();
        assert_eq!(
            evaluation.outcome,
            DecisionOutcome::NoRainIrrigate { amount_mm: 25.0 }
        );
    }

    #[test]
    fn test_above_field_capacity_water_lasts() {
        // real 30: deficit negative, etc3 large enough to skip sufficiency
        let evaluation = engine()
            .evaluate(&inputs(30.0), &forecast(&[(15.0, 0.0); 3]))
            .unwrap();
        assert_eq!(evaluation.outcome, DecisionOutcome::WaterLastsHorizon);
    }

    #[test]
    fn test_outcome_messages_and_kinds() {
        let outcome = DecisionOutcome::NoRainIrrigate { amount_mm: 15.0 };
        assert_eq!(outcome.kind(), "no_rain_irrigate");
        assert!(outcome.to_string().contains("15.0mm"));
        assert!(outcome.should_irrigate());
        assert!(!DecisionOutcome::Sufficient.should_irrigate());
    }
}
