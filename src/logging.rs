//! # Structured Logging Module
//!
//! Environment-aware structured logging for decisions and sensor calls.
//! Console output is human readable by default and JSON when
//! `IRRIGATION_LOG_FORMAT=json`; `RUST_LOG` overrides the level filter.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = wants_json();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // An embedding host may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("IRRIGATION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn wants_json() -> bool {
    std::env::var("IRRIGATION_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log one irrigation decision
pub fn log_decision_operation(
    field_id: &str,
    device_id: &str,
    outcome: &str,
    irrigation_mm: f64,
    is_real_data: bool,
    duration: Duration,
) {
    tracing::info!(
        field_id = %field_id,
        device_id = %device_id,
        outcome = %outcome,
        irrigation_mm = irrigation_mm,
        is_real_data = is_real_data,
        duration_ms = duration.as_millis() as u64,
        timestamp = %Utc::now().to_rfc3339(),
        "💧 DECISION_OPERATION"
    );
}

/// Log one sensor API call, after retries and breaker admission
pub fn log_sensor_operation(
    operation: &str,
    target: &str,
    success: bool,
    duration: Duration,
    records: usize,
) {
    let status = if success { "success" } else { "fallback" };
    tracing::info!(
        operation = %operation,
        target = %target,
        status = %status,
        records = records,
        duration_ms = duration.as_millis() as u64,
        timestamp = %Utc::now().to_rfc3339(),
        "📡 SENSOR_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
