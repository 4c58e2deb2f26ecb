//! # Circuit Breaker Metrics
//!
//! Point-in-time counters for sensor API circuit breakers, used by the CLI
//! and by health logging.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the protected operation
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls rejected without attempting the operation
    pub rejected_calls: u64,
    pub consecutive_failures: u32,
    /// Number of closed/half-open to open transitions
    pub times_opened: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            consecutive_failures: 0,
            times_opened: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.total_calls < 10 || self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing sensor API health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_calls,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate over every breaker a manager has handed out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
}

impl SystemCircuitBreakerMetrics {
    pub fn open_circuits(&self) -> Vec<&str> {
        let mut open: Vec<&str> = self
            .circuit_breakers
            .iter()
            .filter(|(_, metrics)| metrics.current_state == CircuitState::Open)
            .map(|(name, _)| name.as_str())
            .collect();
        open.sort_unstable();
        open
    }

    pub fn is_healthy(&self) -> bool {
        self.circuit_breakers.values().all(|m| m.is_healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_by_state() {
        let mut metrics = CircuitBreakerMetrics::new();
        assert!(metrics.is_healthy());

        metrics.total_calls = 20;
        metrics.failure_rate = 0.5;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::Open;
        assert!(!metrics.is_healthy());
        assert!(metrics.format_summary().starts_with("State: Failing"));
    }

    #[test]
    fn test_open_circuits_listing() {
        let mut open = CircuitBreakerMetrics::new();
        open.current_state = CircuitState::Open;

        let system = SystemCircuitBreakerMetrics {
            circuit_breakers: HashMap::from([
                ("sensor_api:D2".to_string(), open),
                ("sensor_api:D1".to_string(), CircuitBreakerMetrics::new()),
            ]),
        };

        assert_eq!(system.open_circuits(), vec!["sensor_api:D2"]);
        assert!(!system.is_healthy());
    }
}
