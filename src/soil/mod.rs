//! # Soil Parameter Resolution
//!
//! Resolves SAT, FC and PWP for a field through an ordered strategy chain
//! (manual override, history statistics, configured defaults) and pairs them
//! with the current humidity reading. Resolution never fails: every tier
//! that cannot produce a consistent answer hands over to the next one.

pub mod cache;
pub mod parameters;
pub mod resolver;

pub use cache::{CacheKey, CacheStats, SoilStateCache};
pub use parameters::{
    DefaultStrategy, ManualOverrideStrategy, ParameterSource, ParameterStrategy,
    ResolutionContext, SoilParameterSet, StatisticalStrategy, StrategyOutcome,
};
pub use resolver::{ResolvedSoilState, SoilParameterResolver};
