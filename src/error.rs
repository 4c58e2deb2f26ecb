//! Error types for the irrigation decision core.
//!
//! Resolution-layer failures (sensor API, history statistics) never surface here;
//! they are recovered through the fallback chain. What does surface is anything
//! that would make a decision untrustworthy: a missing growth feed, too few
//! forecast rows, an unknown field or a broken configuration.

use crate::config::ConfigurationError;
use crate::growth::FeedError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrrigationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Growth feed unavailable: {0}")]
    GrowthFeed(#[from] FeedError),
    #[error("Insufficient forecast data: {available} day(s) available, at least {required} required")]
    InsufficientForecast { available: usize, required: usize },
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IrrigationError {
    /// True when the error comes from missing or insufficient model output
    /// rather than from the caller or configuration.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            IrrigationError::GrowthFeed(_) | IrrigationError::InsufficientForecast { .. }
        )
    }
}

impl From<serde_json::Error> for IrrigationError {
    fn from(error: serde_json::Error) -> Self {
        IrrigationError::Internal(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, IrrigationError>;
