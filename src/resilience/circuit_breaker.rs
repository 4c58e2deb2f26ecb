//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to the soil sensor API. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (a single
//! trial call decides whether to recover).
//!
//! All transitions happen under one `parking_lot::Mutex`, so concurrent
//! decisions for different fields see a strictly ordered state machine.
//! The lock is never held across an `.await`.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - exactly one trial call is allowed through
    HalfOpen,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not attempted
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Outcome of asking the breaker for permission to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pass,
    Trial,
    Reject,
}

/// Three-state failure gate
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_seconds = config.recovery_timeout_seconds,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit();
        if admission == Admission::Reject {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        let admission = match inner.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .map(|at| at.elapsed() > self.config.recovery_timeout())
                    .unwrap_or(true);
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(
                        component = %self.name,
                        "🟡 Circuit breaker half-open (testing recovery)"
                    );
                    Admission::Trial
                } else {
                    Admission::Reject
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Admission::Reject
                } else {
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
            }
        };

        if admission == Admission::Reject {
            inner.metrics.rejected_calls += 1;
            debug!(component = %self.name, "⛔ Call rejected, circuit open");
        }

        admission
    }

    fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                info!(
                    component = %self.name,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🔴 Operation failed"
        );

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.consecutive_failures += 1;
                self.open(&mut inner);
            }
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
            }
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.last_failure = Some(Instant::now());
        inner.metrics.times_opened += 1;
        warn!(
            component = %self.name,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_seconds = self.config.recovery_timeout_seconds,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        self.open(&mut inner);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.consecutive_failures = inner.consecutive_failures;

        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = Duration::from_secs_f64(
                snapshot.total_duration.as_secs_f64() / snapshot.total_calls as f64,
            );
        }

        snapshot
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}

/// Releases an abandoned half-open trial so the breaker cannot wedge in
/// half-open when the calling future is dropped mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.breaker.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            self.breaker.open(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn test_config(failure_threshold: u32, recovery_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout_seconds: recovery_ms as f64 / 1000.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test", test_config(3, 100));

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let circuit = CircuitBreaker::new("test", test_config(2, 100));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let attempts = AtomicU32::new(0);
        let result = circuit
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_eq!(circuit.metrics().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_success_decrements_failure_count_without_closing_gap() {
        let circuit = CircuitBreaker::new("test", test_config(3, 100));

        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(circuit.consecutive_failures(), 2);

        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(circuit.consecutive_failures(), 1);

        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(circuit.consecutive_failures(), 0);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_recovery() {
        let circuit = CircuitBreaker::new("test", test_config(1, 50));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(80)).await;

        let result = circuit.call(|| async { Ok::<_, String>("recovered") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_circuit() {
        let circuit = CircuitBreaker::new("test", test_config(1, 50));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        sleep(Duration::from_millis(80)).await;

        let result = circuit.call(|| async { Err::<String, _>("still down") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        assert_eq!(circuit.state(), CircuitState::Open);

        // last failure refreshed, so the next call is rejected again
        let result = circuit.call(|| async { Ok::<_, String>("too early") }).await;
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial() {
        let circuit = Arc::new(CircuitBreaker::new("test", test_config(1, 20)));

        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
        sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = Arc::clone(&circuit);
        let trial = tokio::spawn(async move {
            trial_breaker
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, String>("trial")
                })
                .await
        });

        // let the trial reach its await point
        sleep(Duration::from_millis(20)).await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let second = circuit.call(|| async { Ok::<_, String>("second") }).await;
        assert!(second.unwrap_err().is_circuit_open());

        release_tx.send(()).unwrap();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn test_average_duration_survives_call_counts_beyond_u32() {
        let circuit = CircuitBreaker::new("test", test_config(3, 100));
        {
            let mut inner = circuit.inner.lock();
            inner.metrics.total_calls = u64::from(u32::MAX) + 1;
            inner.metrics.success_count = inner.metrics.total_calls;
            inner.metrics.total_duration = Duration::from_secs(u64::from(u32::MAX) + 1);
        }

        let metrics = circuit.metrics();
        assert_eq!(metrics.average_duration, Duration::from_secs(1));
        assert_eq!(metrics.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("test", test_config(5, 1000));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
    }
}
