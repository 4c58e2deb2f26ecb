//! # Resilience Module
//!
//! Fault tolerance for outbound calls to the soil sensor API: a bounded
//! retry policy wrapped by a three-state circuit breaker.
//!
//! ## Architecture
//!
//! - **Retry Policy**: capped exponential backoff with a per-attempt timeout
//! - **Circuit Breakers**: fail fast while the sensor API is down
//! - **Manager**: one global breaker, or one per device when configured
//! - **Metrics**: counters and state snapshots for health reporting
//!
//! A logical call runs as `breaker.call(|| retry.execute(..))`, so one call
//! records exactly one breaker outcome however many attempts it took.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use irrigation_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let circuit_breaker = CircuitBreaker::new("sensor_api", CircuitBreakerConfig::default());
//!
//! let result = circuit_breaker
//!     .call(|| async { Ok::<&str, std::io::Error>("reading") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{BreakerScope, CircuitBreakerConfig, RetryConfig};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{RetryPolicy, Retryable};
