#![allow(clippy::doc_markdown)] // Allow technical terms like ETc, SAT, PWP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Irrigation Core Rust
//!
//! Daily per-field irrigation decisions from soil-moisture sensors, crop-model
//! output and short-range forecasts.
//!
//! ## Overview
//!
//! For each field the core resolves the soil's hydraulic parameters (SAT, FC,
//! PWP) and its current humidity, scales them by root-depth and growth-stage
//! coefficients read from the crop simulator's feed, and applies a fixed
//! decision rule over the forecast window to produce a quantized irrigation
//! amount with a full audit snapshot.
//!
//! ## Resilience
//!
//! The soil sensor API is reached through a retry policy wrapped in a circuit
//! breaker. Sensor failures never fail a decision: the parameter resolver
//! falls back from manual overrides to history statistics to configured
//! defaults, and the live reading falls back to the default humidity. A
//! missing or short growth feed, on the other hand, is always an error.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered, validated configuration and the field registry
//! - [`error`] - Structured error handling
//! - [`resilience`] - Circuit breaker, retry policy and breaker manager
//! - [`sensor`] - Soil sensor API client and transport seam
//! - [`soil`] - Soil parameter strategies, resolver and hour cache
//! - [`growth`] - Growth feed, coefficients and daily model refresh
//! - [`decision`] - Forecast window, decision rule and service
//! - [`logging`] - Structured logging setup and audit helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use irrigation_core::config::ConfigManager;
//! use irrigation_core::decision::IrrigationService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let service = IrrigationService::from_manager(&manager)?;
//! let decision = service.make_irrigation_decision("field-1").await?;
//! println!("{} mm: {}", decision.irrigation_value, decision.message);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod growth;
pub mod logging;
pub mod resilience;
pub mod sensor;
pub mod soil;

pub use config::{ConfigManager, FieldConfig, IrrigationConfig};
pub use decision::{
    DecisionOutcome, IrrigationDecision, IrrigationDecisionEngine, IrrigationService,
    SoilSnapshot,
};
pub use error::{IrrigationError, Result};
pub use growth::{FileGrowthFeed, GrowthContextProvider, GrowthFeed};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState, RetryPolicy};
pub use sensor::{SensorTransport, SoilApiClient};
pub use soil::{ParameterSource, ResolvedSoilState, SoilParameterResolver};
