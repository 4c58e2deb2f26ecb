//! # Irrigation Decisions
//!
//! Forecast window construction, the pure decision rule, amount quantization,
//! the decision output contract and the service that ties soil, growth and
//! forecast data together.

pub mod engine;
pub mod forecast;
pub mod quantize;
pub mod service;
pub mod types;

pub use engine::{DecisionEvaluation, DecisionInputs, DecisionOutcome, IrrigationDecisionEngine};
pub use forecast::{build_forecast, ForecastDay};
pub use quantize::quantize;
pub use service::IrrigationService;
pub use types::{DecisionMeta, IrrigationDecision, SoilData, SoilSnapshot};
