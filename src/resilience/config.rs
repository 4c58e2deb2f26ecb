//! # Resilience Configuration
//!
//! Retry and circuit breaker settings for outbound sensor API calls.
//! Values are configured in seconds and exposed as `Duration` through helpers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How circuit breakers are shared between outbound calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerScope {
    /// One breaker for every call to the sensor API. A failing device can
    /// starve all fields until recovery.
    #[default]
    Global,
    /// One breaker per sensor device id
    PerDevice,
}

/// Configuration for circuit breakers guarding the sensor API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Seconds to wait in open state before letting a trial call through
    pub recovery_timeout_seconds: f64,

    /// Breaker sharing scope
    pub scope: BreakerScope,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.recovery_timeout_seconds.max(0.0))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout_seconds.is_nan() || self.recovery_timeout_seconds <= 0.0 {
            return Err("recovery_timeout_seconds must be greater than 0".to_string());
        }

        if self.recovery_timeout_seconds > 3600.0 {
            return Err("recovery_timeout_seconds should not exceed 3600".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_seconds: 60.0,
            scope: BreakerScope::Global,
        }
    }
}

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for a single logical call, first attempt included
    pub max_attempts: u32,

    /// Base of the exponential backoff in seconds
    pub backoff_base_seconds: f64,

    /// Per-attempt timeout in seconds
    pub timeout_seconds: f64,

    /// Upper bound for a single backoff sleep in seconds
    pub max_wait_seconds: f64,
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs_f64(self.max_wait_seconds.max(0.0))
    }

    /// Sleep after the failed attempt with 0-based index `attempt`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30) as i32;
        let seconds = (self.backoff_base_seconds * 2f64.powi(exponent)).min(self.max_wait_seconds);
        Duration::from_secs_f64(seconds.max(0.0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if self.backoff_base_seconds < 0.0 || !self.backoff_base_seconds.is_finite() {
            return Err("backoff_base_seconds must be a non-negative number".to_string());
        }

        if self.timeout_seconds.is_nan() || self.timeout_seconds <= 0.0 {
            return Err("timeout_seconds must be greater than 0".to_string());
        }

        if self.max_wait_seconds < 0.0 || !self.max_wait_seconds.is_finite() {
            return Err("max_wait_seconds must be a non-negative number".to_string());
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_seconds: 1.0,
            timeout_seconds: 15.0,
            max_wait_seconds: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        let valid_config = CircuitBreakerConfig::default();
        assert!(valid_config.validate().is_ok());
        assert_eq!(valid_config.recovery_timeout(), Duration::from_secs(60));

        let mut invalid_config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            recovery_timeout_seconds: 0.0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_backoff_is_capped_by_max_wait() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for(0), Duration::from_secs(1));
        assert_eq!(retry.backoff_for(1), Duration::from_secs(2));
        assert_eq!(retry.backoff_for(3), Duration::from_secs(8));
        assert_eq!(retry.backoff_for(4), Duration::from_secs(10));
        assert_eq!(retry.backoff_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_config_validation() {
        assert!(RetryConfig::default().validate().is_ok());

        let zero_attempts = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero_attempts.validate().is_err());

        let zero_timeout = RetryConfig {
            timeout_seconds: 0.0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_scope_deserializes_snake_case() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"scope": "per_device"}"#).unwrap();
        assert_eq!(config.scope, BreakerScope::PerDevice);
        assert_eq!(config.failure_threshold, 5);
    }
}
