//! # Irrigation Service
//!
//! Wires the sensor client, soil resolver, growth context and decision engine
//! into the two decision entry points and the soil snapshot. Soil resolution
//! never fails; a missing or short growth feed always does.

use crate::config::{ConfigManager, IrrigationConfig};
use crate::decision::engine::{DecisionEvaluation, DecisionInputs, IrrigationDecisionEngine};
use crate::decision::forecast::build_forecast;
use crate::decision::types::{build_meta, IrrigationDecision, SoilData, SoilSnapshot};
use crate::error::{IrrigationError, Result};
use crate::growth::{
    CropModelRefresher, FileGrowthFeed, GrowthCoefficients, GrowthContextProvider, GrowthFeed,
};
use crate::logging::{log_decision_operation, log_error};
use crate::resilience::CircuitBreakerManager;
use crate::sensor::types::round2;
use crate::sensor::{HttpSensorTransport, SensorTransport, SoilApiClient};
use crate::soil::cache::hour_bucket;
use crate::soil::{ResolvedSoilState, SoilParameterResolver};
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct IrrigationService {
    config: Arc<IrrigationConfig>,
    client: Arc<SoilApiClient>,
    resolver: SoilParameterResolver,
    feed: Arc<dyn GrowthFeed>,
    growth: GrowthContextProvider,
    refresher: CropModelRefresher,
    engine: IrrigationDecisionEngine,
}

impl IrrigationService {
    /// Service over explicit collaborators
    pub fn new(
        config: Arc<IrrigationConfig>,
        transport: Arc<dyn SensorTransport>,
        feed: Arc<dyn GrowthFeed>,
        refresher: CropModelRefresher,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::from_config(&config.circuit_breaker));
        let client = Arc::new(SoilApiClient::new(
            Arc::clone(&config),
            transport,
            breakers,
        ));
        let resolver = SoilParameterResolver::new(Arc::clone(&config), Arc::clone(&client));
        let growth = GrowthContextProvider::new(Arc::clone(&feed), &config.growth);
        let engine = IrrigationDecisionEngine::new(config.decision.clone());

        Self {
            config,
            client,
            resolver,
            feed,
            growth,
            refresher,
            engine,
        }
    }

    /// HTTP transport, on-disk growth feed and the configured simulator command
    pub fn from_config(config: Arc<IrrigationConfig>) -> Result<Self> {
        let transport = HttpSensorTransport::new(&config.sensor_api, config.retry.timeout())?;
        let feed = FileGrowthFeed::new(
            config.growth.feed_path.clone(),
            config.growth.stage_table_path.clone(),
            config.growth.header_skip_lines,
        );
        let refresher = CropModelRefresher::from_config(&config.growth);
        Ok(Self::new(
            config,
            Arc::new(transport),
            Arc::new(feed),
            refresher,
        ))
    }

    /// Like `from_config`, with feed paths resolved against the config directory
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let mut config = manager.config().clone();
        config.growth.feed_path = manager.resolve_path(&config.growth.feed_path);
        config.growth.stage_table_path = manager.resolve_path(&config.growth.stage_table_path);
        if let Some(dir) = config.growth.model_working_dir.take() {
            config.growth.model_working_dir = Some(manager.resolve_path(dir));
        }
        Self::from_config(Arc::new(config))
    }

    pub fn config(&self) -> &IrrigationConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<SoilApiClient> {
        &self.client
    }

    pub fn resolver(&self) -> &SoilParameterResolver {
        &self.resolver
    }

    /// Decision for a registered field, reading humidity from its sensor
    pub async fn make_irrigation_decision(&self, field_id: &str) -> Result<IrrigationDecision> {
        self.make_irrigation_decision_at(field_id, Local::now().naive_local())
            .await
    }

    #[instrument(skip(self), fields(field_id = %field_id))]
    pub async fn make_irrigation_decision_at(
        &self,
        field_id: &str,
        now: NaiveDateTime,
    ) -> Result<IrrigationDecision> {
        let device_id = self.config.device_for_field(field_id)?.to_string();
        let state = self.resolver.resolve(field_id, &device_id, now).await;
        self.decide(field_id, &device_id, state, now).await
    }

    /// Decision around a caller-supplied humidity reading (%)
    pub async fn make_irrigation_decision_with_reading(
        &self,
        field_id: &str,
        device_id: &str,
        real_humidity: f64,
    ) -> Result<IrrigationDecision> {
        self.make_irrigation_decision_with_reading_at(
            field_id,
            device_id,
            real_humidity,
            Local::now().naive_local(),
        )
        .await
    }

    #[instrument(skip(self), fields(field_id = %field_id, device_id = %device_id))]
    pub async fn make_irrigation_decision_with_reading_at(
        &self,
        field_id: &str,
        device_id: &str,
        real_humidity: f64,
        now: NaiveDateTime,
    ) -> Result<IrrigationDecision> {
        if !real_humidity.is_finite() {
            return Err(IrrigationError::InvalidInput(format!(
                "real_humidity must be a finite number, got {real_humidity}"
            )));
        }
        let state = self
            .resolver
            .resolve_with_reading(field_id, device_id, real_humidity, now)
            .await;
        self.decide(field_id, device_id, state, now).await
    }

    /// Resolved soil state and mm figures for a registered field, no decision
    pub async fn soil_snapshot(&self, field_id: &str) -> Result<SoilSnapshot> {
        self.soil_snapshot_at(field_id, Local::now().naive_local())
            .await
    }

    pub async fn soil_snapshot_at(
        &self,
        field_id: &str,
        now: NaiveDateTime,
    ) -> Result<SoilSnapshot> {
        let device_id = self.config.device_for_field(field_id)?.to_string();
        let state = self.resolver.resolve(field_id, &device_id, now).await;
        let coefficients = self.growth.coefficients(now.date());
        let inputs = self.inputs(&state, &coefficients, now);

        Ok(SoilSnapshot {
            field_id: field_id.to_string(),
            device_id,
            hour_bucket: hour_bucket(now),
            history_rows: state.history_rows,
            available_to_pwp_mm: round2(inputs.available_to_pwp_mm()),
            deficit_to_fc_mm: round2(inputs.deficit_to_fc_mm()),
            soil_data: SoilData::from_state(&inputs, &state, &coefficients),
        })
    }

    async fn decide(
        &self,
        field_id: &str,
        device_id: &str,
        state: ResolvedSoilState,
        now: NaiveDateTime,
    ) -> Result<IrrigationDecision> {
        let started = Instant::now();
        let today = now.date();

        self.refresher.refresh_if_due(today).await;
        let coefficients = self.growth.coefficients(today);
        let inputs = self.inputs(&state, &coefficients, now);

        let (evaluation, forecast_days) = match self.forecast_and_evaluate(&inputs) {
            Ok(evaluated) => evaluated,
            Err(error) => {
                log_error(
                    "irrigation_service",
                    "make_irrigation_decision",
                    &error.to_string(),
                    Some(field_id),
                );
                return Err(error);
            }
        };

        let outcome = &evaluation.outcome;
        let irrigation_value = round2(outcome.irrigation_mm());
        let decision = IrrigationDecision {
            date: today,
            field_id: field_id.to_string(),
            device_id: device_id.to_string(),
            message: format!(
                "Current soil volumetric water content: {:.2} %, {}",
                inputs.real_humidity, outcome
            ),
            irrigation_value,
            soil_data: SoilData::from_state(&inputs, &state, &coefficients),
            meta: build_meta(&evaluation, self.engine.config(), forecast_days),
        };

        info!(
            field_id = field_id,
            outcome = outcome.kind(),
            irrigation_mm = irrigation_value,
            "🚿 Irrigation decision made"
        );
        log_decision_operation(
            field_id,
            device_id,
            outcome.kind(),
            irrigation_value,
            state.is_real_data,
            started.elapsed(),
        );

        Ok(decision)
    }

    fn forecast_and_evaluate(
        &self,
        inputs: &DecisionInputs,
    ) -> Result<(DecisionEvaluation, usize)> {
        let decision = &self.config.decision;
        let rows = self.feed.rows()?;
        let forecast = build_forecast(
            &rows,
            inputs.today,
            decision.forecast_horizon_days,
            decision.min_forecast_data_days,
        )?;
        let evaluation = self.engine.evaluate(inputs, &forecast)?;
        Ok((evaluation, forecast.len()))
    }

    fn inputs(
        &self,
        state: &ResolvedSoilState,
        coefficients: &GrowthCoefficients,
        now: NaiveDateTime,
    ) -> DecisionInputs {
        DecisionInputs {
            today: now.date(),
            real_humidity: state.real_humidity,
            sat_percent: state.parameters.sat_percent,
            fc_percent: state.parameters.fc_percent,
            pwp_percent: state.parameters.pwp_percent,
            root_depth_coefficient: coefficients.root_depth_coefficient,
            growth_stage_coefficient: coefficients.growth_stage_coefficient,
            soil_depth_cm: f64::from(self.config.soil.depth_cm),
        }
    }
}
