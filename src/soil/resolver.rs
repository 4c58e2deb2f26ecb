//! Soil parameter resolution
//!
//! Walks the strategy chain (manual, statistical, default) and pairs the
//! winning parameter set with the instantaneous humidity reading. Results are
//! cached per (device, field, hour).

use crate::config::IrrigationConfig;
use crate::sensor::{ReadingSource, SoilApiClient};
use crate::soil::cache::{CacheKey, SoilStateCache};
use crate::soil::parameters::{
    DefaultStrategy, ManualOverrideStrategy, ParameterSource, ParameterStrategy,
    ResolutionContext, SoilParameterSet, StatisticalStrategy,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the decision engine needs to know about the soil of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSoilState {
    pub parameters: SoilParameterSet,
    pub real_humidity: f64,
    pub real_humidity_source: ReadingSource,
    pub history_rows: usize,
    /// True when any figure came from somewhere other than the defaults
    pub is_real_data: bool,
}

impl ResolvedSoilState {
    fn assemble(
        parameters: SoilParameterSet,
        real_humidity: f64,
        real_humidity_source: ReadingSource,
        history_rows: usize,
    ) -> Self {
        let is_real_data = real_humidity_source != ReadingSource::Default
            || parameters.source != ParameterSource::Default
            || history_rows > 0;
        Self {
            parameters,
            real_humidity,
            real_humidity_source,
            history_rows,
            is_real_data,
        }
    }
}

#[derive(Debug)]
pub struct SoilParameterResolver {
    config: Arc<IrrigationConfig>,
    client: Arc<SoilApiClient>,
    strategies: Vec<Box<dyn ParameterStrategy>>,
    cache: SoilStateCache,
}

impl SoilParameterResolver {
    /// Standard chain: manual override, history statistics, defaults
    pub fn new(config: Arc<IrrigationConfig>, client: Arc<SoilApiClient>) -> Self {
        let strategies: Vec<Box<dyn ParameterStrategy>> = vec![
            Box::new(ManualOverrideStrategy),
            Box::new(StatisticalStrategy::new(
                Arc::clone(&config),
                Arc::clone(&client),
            )),
            Box::new(DefaultStrategy::new(&config.soil)),
        ];
        Self::with_strategies(config, client, strategies)
    }

    pub fn with_strategies(
        config: Arc<IrrigationConfig>,
        client: Arc<SoilApiClient>,
        strategies: Vec<Box<dyn ParameterStrategy>>,
    ) -> Self {
        let cache = SoilStateCache::new(config.cache.enabled);
        Self {
            config,
            client,
            strategies,
            cache,
        }
    }

    pub fn cache(&self) -> &SoilStateCache {
        &self.cache
    }

    /// Full soil state, from cache when this hour already resolved it
    pub async fn resolve(
        &self,
        field_id: &str,
        device_id: &str,
        now: NaiveDateTime,
    ) -> ResolvedSoilState {
        let key = CacheKey::new(device_id, field_id, now);
        if let Some(cached) = self.cache.get(&key) {
            debug!(
                field_id = field_id,
                device_id = device_id,
                bucket = %key.hour_bucket,
                "Soil state served from cache"
            );
            return cached;
        }

        let (parameters, history_rows) = self.resolve_parameters(field_id, device_id, now).await;

        let reading = self.client.fetch_latest(field_id).await;
        let real_humidity = self.sanitize_reading(field_id, reading.value(), &parameters);

        let state = ResolvedSoilState::assemble(
            parameters,
            real_humidity,
            reading.source(),
            history_rows,
        );

        info!(
            field_id = field_id,
            device_id = device_id,
            sat = state.parameters.sat_percent,
            fc = state.parameters.fc_percent,
            pwp = state.parameters.pwp_percent,
            source = %state.parameters.source,
            real_humidity = state.real_humidity,
            is_real_data = state.is_real_data,
            "🌱 Soil state resolved"
        );

        self.cache.insert(key, state.clone());
        state
    }

    /// Soil state around a caller-supplied humidity reading. The latest-reading
    /// endpoint is not called and the result is not cached.
    pub async fn resolve_with_reading(
        &self,
        field_id: &str,
        device_id: &str,
        real_humidity: f64,
        now: NaiveDateTime,
    ) -> ResolvedSoilState {
        let key = CacheKey::new(device_id, field_id, now);
        let (parameters, history_rows) = match self.cache.get(&key) {
            Some(cached) => (cached.parameters, cached.history_rows),
            None => self.resolve_parameters(field_id, device_id, now).await,
        };

        let real_humidity = self.sanitize_reading(field_id, real_humidity, &parameters);
        ResolvedSoilState::assemble(parameters, real_humidity, ReadingSource::Caller, history_rows)
    }

    /// First consistent candidate in strategy order, plus history rows seen
    pub async fn resolve_parameters(
        &self,
        field_id: &str,
        device_id: &str,
        now: NaiveDateTime,
    ) -> (SoilParameterSet, usize) {
        let context = ResolutionContext {
            field_id,
            device_id,
            field: self.config.field(field_id),
            today: now.date(),
        };

        let mut history_rows = 0;
        for strategy in &self.strategies {
            let outcome = strategy.propose(&context).await;
            history_rows += outcome.history_rows;

            let Some(candidate) = outcome.candidate else {
                continue;
            };

            if self.accept(&candidate) {
                debug!(
                    field_id = field_id,
                    strategy = strategy.name(),
                    "Soil parameter strategy accepted"
                );
                return (candidate, history_rows);
            }

            warn!(
                field_id = field_id,
                strategy = strategy.name(),
                sat = candidate.sat_percent,
                fc = candidate.fc_percent,
                pwp = candidate.pwp_percent,
                "⚠️ Rejected inconsistent soil parameters, trying next source"
            );
        }

        // An empty or custom chain with no acceptable candidate still yields
        // the configured constants.
        (SoilParameterSet::defaults(&self.config.soil), history_rows)
    }

    fn accept(&self, candidate: &SoilParameterSet) -> bool {
        if !candidate.is_consistent() {
            return false;
        }
        match candidate.source {
            ParameterSource::Statistical => {
                candidate.within_bounds(&self.config.soil.statistical_bounds)
            }
            ParameterSource::Manual | ParameterSource::Default => true,
        }
    }

    /// Clamp into the configured humidity range, then up to PWP
    fn sanitize_reading(&self, field_id: &str, value: f64, parameters: &SoilParameterSet) -> f64 {
        let clamped = self.config.soil.clamp_humidity(value);
        if clamped != value {
            warn!(
                field_id = field_id,
                raw = value,
                clamped = clamped,
                "Humidity outside configured range, clamped"
            );
        }

        if clamped < parameters.pwp_percent {
            warn!(
                field_id = field_id,
                humidity = clamped,
                pwp = parameters.pwp_percent,
                "Humidity below wilting point, raised to PWP"
            );
            return parameters.pwp_percent;
        }

        clamped
    }
}
