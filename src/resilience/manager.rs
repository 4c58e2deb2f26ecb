//! # Circuit Breaker Manager
//!
//! Hands out the breaker guarding a given sensor device. With the default
//! `global` scope every device shares one breaker; `per_device` isolates
//! failure domains by keying breakers on the device id.

use crate::resilience::{
    BreakerScope, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
    SystemCircuitBreakerMetrics,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const COMPONENT: &str = "sensor_api";

#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    global: Arc<CircuitBreaker>,
    per_device: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            scope = ?config.scope,
            failure_threshold = config.failure_threshold,
            "Initializing circuit breaker manager"
        );

        Self {
            config: config.clone(),
            global: Arc::new(CircuitBreaker::new(COMPONENT, config.clone())),
            per_device: DashMap::new(),
        }
    }

    pub fn scope(&self) -> BreakerScope {
        self.config.scope
    }

    /// Breaker for calls concerning `device_id`
    pub fn breaker_for(&self, device_id: &str) -> Arc<CircuitBreaker> {
        match self.config.scope {
            BreakerScope::Global => Arc::clone(&self.global),
            BreakerScope::PerDevice => {
                if let Some(existing) = self.per_device.get(device_id) {
                    return Arc::clone(existing.value());
                }
                let entry = self
                    .per_device
                    .entry(device_id.to_string())
                    .or_insert_with(|| {
                        info!(device_id = device_id, "Created per-device circuit breaker");
                        Arc::new(CircuitBreaker::new(
                            format!("{COMPONENT}:{device_id}"),
                            self.config.clone(),
                        ))
                    });
                Arc::clone(entry.value())
            }
        }
    }

    /// Breaker names currently in use
    pub fn list_components(&self) -> Vec<String> {
        match self.config.scope {
            BreakerScope::Global => vec![self.global.name().to_string()],
            BreakerScope::PerDevice => {
                let mut names: Vec<String> = self
                    .per_device
                    .iter()
                    .map(|entry| entry.value().name().to_string())
                    .collect();
                names.sort();
                names
            }
        }
    }

    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let circuit_breakers: HashMap<String, CircuitBreakerMetrics> = match self.config.scope {
            BreakerScope::Global => {
                [(self.global.name().to_string(), self.global.metrics())].into()
            }
            BreakerScope::PerDevice => self
                .per_device
                .iter()
                .map(|entry| (entry.value().name().to_string(), entry.value().metrics()))
                .collect(),
        };

        SystemCircuitBreakerMetrics { circuit_breakers }
    }
}
