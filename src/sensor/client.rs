//! Soil sensor API client
//!
//! Every call runs as `breaker.call(|| retry.execute(..))`. Failures never
//! escape: history calls degrade to an empty table and latest-reading calls
//! to the configured default humidity, with the reason logged.

use crate::config::IrrigationConfig;
use crate::logging::log_sensor_operation;
use crate::resilience::{CircuitBreakerError, CircuitBreakerManager, RetryPolicy};
use crate::sensor::transport::{FormPayload, SensorTransport, TransportError};
use crate::sensor::types::{
    humidity_key, humidity_key_depth, parse_day, parse_epoch_millis, parse_number, round2,
    HumidityTable, LatestReading, SoilSample, HISTORY_DEPTHS_CM,
};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const TOKEN_FIELD: &str = "token";

pub struct SoilApiClient {
    config: Arc<IrrigationConfig>,
    transport: Arc<dyn SensorTransport>,
    breakers: Arc<CircuitBreakerManager>,
    retry: RetryPolicy,
}

impl SoilApiClient {
    pub fn new(
        config: Arc<IrrigationConfig>,
        transport: Arc<dyn SensorTransport>,
        breakers: Arc<CircuitBreakerManager>,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            transport,
            breakers,
            retry,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    /// Daily-average humidity history for `device_id` over `[start, end]`.
    ///
    /// Returns an empty table when the circuit is open, retries ran out or the
    /// payload was unusable; callers treat empty as "use the next fallback".
    pub async fn fetch_daily_average(
        &self,
        device_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HumidityTable {
        let form = vec![
            ("deviceCode".to_string(), device_id.to_string()),
            ("startDay".to_string(), start.format("%Y-%m-%d").to_string()),
            ("endDay".to_string(), end.format("%Y-%m-%d").to_string()),
        ];
        let endpoint = self.config.sensor_api.daily_average_path.clone();

        let started = Instant::now();
        let data = match self.call_api(device_id, &endpoint, form).await {
            Ok(data) => data,
            Err(reason) => {
                warn!(
                    device_id = device_id,
                    start = %start,
                    end = %end,
                    reason = %reason,
                    "⚠️ Daily-average history unavailable, returning empty table"
                );
                log_sensor_operation("daily_average", device_id, false, started.elapsed(), 0);
                return HumidityTable::empty();
            }
        };

        let table = self.parse_history(device_id, &data);
        log_sensor_operation(
            "daily_average",
            device_id,
            true,
            started.elapsed(),
            table.len(),
        );
        table
    }

    /// Most recent humidity for a field at the configured soil depth
    pub async fn fetch_latest(&self, field_id: &str) -> LatestReading {
        let default_value = self.config.soil.default_real_humidity;
        let breaker_key = self
            .config
            .field(field_id)
            .map(|field| field.device_id.clone())
            .unwrap_or_else(|| field_id.to_string());
        let form = vec![("sectionID".to_string(), field_id.to_string())];
        let endpoint = self.config.sensor_api.latest_path.clone();

        let started = Instant::now();
        let data = match self.call_api(&breaker_key, &endpoint, form).await {
            Ok(data) => data,
            Err(reason) => {
                warn!(
                    field_id = field_id,
                    reason = %reason,
                    default_humidity = default_value,
                    "⚠️ Latest reading unavailable, using default humidity"
                );
                log_sensor_operation("latest", field_id, false, started.elapsed(), 0);
                return LatestReading::fallback(default_value);
            }
        };

        let reading = match self.parse_latest(field_id, &data) {
            Some(reading) => reading,
            None => LatestReading::fallback(default_value),
        };
        log_sensor_operation(
            "latest",
            field_id,
            reading.is_real(),
            started.elapsed(),
            usize::from(reading.is_real()),
        );
        reading
    }

    async fn call_api(
        &self,
        breaker_key: &str,
        endpoint: &str,
        form: FormPayload,
    ) -> Result<Value, ClientFailure> {
        let form = self.with_token(form);
        let breaker = self.breakers.breaker_for(breaker_key);

        breaker
            .call(|| self.retry.execute(endpoint, || self.attempt(endpoint, &form)))
            .await
            .map_err(ClientFailure::from)
    }

    async fn attempt(&self, endpoint: &str, form: &FormPayload) -> Result<Value, TransportError> {
        let response = self.transport.post_form(endpoint, form).await?;
        let body = response.into_json()?;
        extract_data(body)
    }

    fn with_token(&self, mut form: FormPayload) -> FormPayload {
        let has_token = form.iter().any(|(key, _)| key == TOKEN_FIELD);
        if !has_token && !self.config.sensor_api.api_key.is_empty() {
            form.push((
                TOKEN_FIELD.to_string(),
                self.config.sensor_api.api_key.clone(),
            ));
        }
        form
    }

    fn parse_history(&self, device_id: &str, data: &Value) -> HumidityTable {
        let Some(rows) = data.as_array() else {
            warn!(device_id = device_id, "History payload 'data' is not a list");
            return HumidityTable::empty();
        };

        let floor = self.config.soil.min_plausible_humidity;
        let mut dropped = 0usize;
        let mut samples: Vec<SoilSample> = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(object) = row.as_object() else {
                dropped += 1;
                continue;
            };
            let Some(date) = object.get("dt").and_then(parse_day) else {
                dropped += 1;
                continue;
            };

            let readings = humidity_readings(object);
            let plausible = HISTORY_DEPTHS_CM
                .iter()
                .all(|depth| readings.get(depth).is_some_and(|value| *value >= floor));
            if !plausible {
                dropped += 1;
                continue;
            }

            samples.push(SoilSample {
                device_id: device_id.to_string(),
                date,
                readings,
            });
        }

        samples.sort_by_key(|sample| sample.date);

        if dropped > 0 {
            debug!(
                device_id = device_id,
                dropped = dropped,
                kept = samples.len(),
                floor = floor,
                "Dropped implausible history rows"
            );
        }

        HumidityTable { samples }
    }

    fn parse_latest(&self, field_id: &str, data: &Value) -> Option<LatestReading> {
        let Some(record) = data.as_array().and_then(|rows| rows.first()).and_then(Value::as_object)
        else {
            warn!(field_id = field_id, "Latest reading payload has no records");
            return None;
        };

        let depth = self.config.soil.depth_cm;
        let exact = record
            .get(&humidity_key(depth))
            .and_then(parse_number)
            .map(|value| (depth, value));

        let (depth_used, value) = match exact {
            Some(found) => found,
            None => {
                let fallback = humidity_readings(record).into_iter().next();
                match fallback {
                    Some(found) => {
                        warn!(
                            field_id = field_id,
                            wanted_depth_cm = depth,
                            used_depth_cm = found.0,
                            "Configured depth missing from latest reading, using first available depth"
                        );
                        found
                    }
                    None => {
                        warn!(field_id = field_id, "Latest reading has no humidity fields");
                        return None;
                    }
                }
            }
        };

        if !(0.0..=100.0).contains(&value) {
            warn!(
                field_id = field_id,
                humidity = value,
                "Latest humidity outside 0-100%, using default"
            );
            return None;
        }

        let measured_at = record.get("msgTimeStr").and_then(parse_epoch_millis);
        debug!(
            field_id = field_id,
            humidity = value,
            depth_cm = depth_used,
            measured_at = ?measured_at,
            "Latest soil humidity"
        );

        Some(LatestReading::from_sensor(round2(value), depth_used, measured_at))
    }
}

impl fmt::Debug for SoilApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoilApiClient")
            .field("transport", &self.transport)
            .field("breaker_scope", &self.breakers.scope())
            .finish()
    }
}

/// Depth-tagged humidity fields of one wire record, ascending by depth
fn humidity_readings(record: &Map<String, Value>) -> BTreeMap<u32, f64> {
    record
        .iter()
        .filter_map(|(key, value)| Some((humidity_key_depth(key)?, parse_number(value)?)))
        .collect()
}

/// `{code, data}` envelope; `code == 0` means success
fn extract_data(body: Value) -> Result<Value, TransportError> {
    let Value::Object(mut envelope) = body else {
        return Err(TransportError::MalformedBody(
            "response is not a JSON object".to_string(),
        ));
    };

    let code = envelope.get("code").cloned().unwrap_or(Value::Null);
    let succeeded = match &code {
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => s.trim() == "0",
        _ => false,
    };

    if !succeeded {
        let message = envelope
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("no error message")
            .to_string();
        return Err(TransportError::Api {
            code: code.to_string(),
            message,
        });
    }

    match envelope.remove("data") {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(TransportError::Api {
            code: code.to_string(),
            message: "response has no data".to_string(),
        }),
    }
}

/// Why a sensor call produced no value
#[derive(Debug)]
enum ClientFailure {
    CircuitOpen(String),
    Transport(TransportError),
}

impl From<CircuitBreakerError<TransportError>> for ClientFailure {
    fn from(error: CircuitBreakerError<TransportError>) -> Self {
        match error {
            CircuitBreakerError::CircuitOpen { component } => ClientFailure::CircuitOpen(component),
            CircuitBreakerError::OperationFailed(inner) => ClientFailure::Transport(inner),
        }
    }
}

impl fmt::Display for ClientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientFailure::CircuitOpen(component) => write!(f, "circuit open for {component}"),
            ClientFailure::Transport(error) => write!(f, "{error}"),
        }
    }
}
