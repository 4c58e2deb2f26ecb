//! Shared fixtures for integration tests: a scripted sensor transport that
//! counts calls per endpoint, configuration builders and growth-feed files.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use irrigation_core::config::{FieldConfig, IrrigationConfig, SensorApiConfig};
use irrigation_core::resilience::{CircuitBreakerConfig, RetryConfig};
use irrigation_core::sensor::{FormPayload, SensorTransport, TransportError, TransportResponse};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const HISTORY_ENDPOINT: &str = "soilTestingApi/v1/getDailyAvg";
pub const LATEST_ENDPOINT: &str = "irrigationApi/v2/getSoilLast";

pub type StubReply = Result<TransportResponse, TransportError>;

/// Scripted transport. One-shot replies queued with `enqueue` are served
/// first, then the standing reply set with `respond`; an endpoint with
/// neither fails to connect.
#[derive(Debug, Default)]
pub struct StubTransport {
    standing: Mutex<HashMap<String, StubReply>>,
    queued: Mutex<HashMap<String, VecDeque<StubReply>>>,
    calls: Mutex<HashMap<String, Vec<FormPayload>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: &str, reply: StubReply) -> &Self {
        self.standing.lock().insert(endpoint.to_string(), reply);
        self
    }

    pub fn enqueue(&self, endpoint: &str, reply: StubReply) -> &Self {
        self.queued
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().get(endpoint).map_or(0, Vec::len)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().map(Vec::len).sum()
    }

    pub fn forms(&self, endpoint: &str) -> Vec<FormPayload> {
        self.calls.lock().get(endpoint).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SensorTransport for StubTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        form: &FormPayload,
    ) -> Result<TransportResponse, TransportError> {
        self.calls
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push(form.clone());

        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        self.standing
            .lock()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Connect(format!("no stub for {endpoint}"))))
    }
}

/// `(date, 10cm, 20cm, 30cm)` rows as a successful history payload
pub fn history_reply(rows: &[(&str, f64, f64, f64)]) -> StubReply {
    let data: Vec<_> = rows
        .iter()
        .map(|(dt, h10, h20, h30)| {
            json!({
                "dt": dt,
                "soilHumidity10Value": h10,
                "soilHumidity20Value": h20,
                "soilHumidity30Value": h30,
            })
        })
        .collect();
    Ok(TransportResponse::ok(
        json!({ "code": 0, "data": data }).to_string(),
    ))
}

pub fn latest_reply(humidity_30cm: f64) -> StubReply {
    Ok(TransportResponse::ok(
        json!({
            "code": "0",
            "data": [{
                "soilHumidity30Value": humidity_30cm.to_string(),
                "msgTimeStr": 1_764_576_000_000_i64,
            }]
        })
        .to_string(),
    ))
}

/// Latest-endpoint payload whose single record is `record` verbatim
pub fn latest_record_reply(record: serde_json::Value) -> StubReply {
    Ok(TransportResponse::ok(
        json!({ "code": 0, "data": [record] }).to_string(),
    ))
}

pub fn api_error_reply() -> StubReply {
    Ok(TransportResponse::ok(
        json!({ "code": 500, "msg": "device offline" }).to_string(),
    ))
}

pub fn server_error_reply() -> StubReply {
    Ok(TransportResponse {
        status: 503,
        body: "unavailable".to_string(),
    })
}

pub fn status_reply(status: u16, body: impl Into<String>) -> StubReply {
    Ok(TransportResponse {
        status,
        body: body.into(),
    })
}

/// Two registered fields on separate devices, fast retries, breaker
/// threshold of 3
pub fn test_config() -> IrrigationConfig {
    IrrigationConfig {
        retry: RetryConfig {
            max_attempts: 2,
            backoff_base_seconds: 0.001,
            timeout_seconds: 1.0,
            max_wait_seconds: 0.005,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout_seconds: 60.0,
            ..Default::default()
        },
        fields: vec![FieldConfig::new("F1", "D1"), FieldConfig::new("F2", "D2")],
        default_field_id: Some("F1".to_string()),
        sensor_api: SensorApiConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date")
}

pub fn now() -> NaiveDateTime {
    today().and_hms_opt(9, 30, 0).expect("valid time")
}

/// Growth feed files in a temp dir; keep the `TempDir` alive for the test
pub struct FeedFixture {
    pub dir: TempDir,
    pub feed_path: PathBuf,
    pub stage_path: PathBuf,
}

/// Simulator output with one row per `(root_depth_m, etc_mm, rain_mm)`
/// starting at `start`, plus a stage table whose December stage has a
/// neutral coefficient
pub fn write_feed(start: NaiveDate, days: &[(f64, f64, f64)]) -> FeedFixture {
    let dir = TempDir::new().expect("temp dir");
    let feed_path = dir.path().join("wheat.out");
    let stage_path = dir.path().join("growth_stages.csv");

    let mut content = String::new();
    for i in 0..10 {
        content.push_str(&format!("preamble line {i}\n"));
    }
    content.push_str("  Year-DOY  Date      Zr     ETc    Rain\n");
    for (offset, (zr, etc, rain)) in days.iter().enumerate() {
        let date = start + Duration::days(offset as i64);
        content.push_str(&format!(
            "  2025-{:03}  {}  {:.2}  {:.2}  {:.2}\n",
            offset + 335,
            date.format("%m/%d/%y"),
            zr,
            etc,
            rain
        ));
    }
    fs::write(&feed_path, content).expect("write feed");

    fs::write(
        &stage_path,
        "stage,start_date,end_date\njointing-heading,2025-11-01,2025-12-31\n",
    )
    .expect("write stages");

    FeedFixture {
        dir,
        feed_path,
        stage_path,
    }
}
