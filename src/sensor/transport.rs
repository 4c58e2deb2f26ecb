//! Network seam for the sensor API
//!
//! `SensorTransport` posts one form to one endpoint. The production
//! implementation uses `reqwest`; tests script responses instead.

use crate::config::{ConfigurationError, SensorApiConfig};
use crate::resilience::Retryable;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Ordered form fields
pub type FormPayload = Vec<(String, String)>;

/// Failures of a single attempt against the sensor API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    /// Well-formed payload reporting a non-zero result code
    #[error("API error code {code}: {message}")]
    Api { code: String, message: String },

    #[error("Request error: {0}")]
    Request(String),
}

impl TransportError {
    /// Connect/timeout failures, throttling, server errors and garbled bodies
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_)
            | TransportError::Timeout { .. }
            | TransportError::MalformedBody(_) => true,
            TransportError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            TransportError::Api { .. } | TransportError::Request(_) => false,
        }
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }

    fn timed_out(after: Duration) -> Self {
        TransportError::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout { after_ms: 0 }
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            TransportError::MalformedBody(error.to_string())
        } else if error.is_request() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

/// Characters of a non-2xx body kept in the error
const ERROR_BODY_CHARS: usize = 200;

/// Raw HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Parse the body as JSON after rejecting non-2xx statuses
    pub fn into_json(self) -> Result<Value, TransportError> {
        if !(200..300).contains(&self.status) {
            let body: String = self.body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(TransportError::Status {
                status: self.status,
                body,
            });
        }
        serde_json::from_str(&self.body).map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}

#[async_trait]
pub trait SensorTransport: Send + Sync + fmt::Debug {
    async fn post_form(
        &self,
        endpoint: &str,
        form: &FormPayload,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport
pub struct HttpSensorTransport {
    client: Client,
    base_url: Url,
}

impl HttpSensorTransport {
    pub fn new(config: &SensorApiConfig, request_timeout: Duration) -> Result<Self, ConfigurationError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            ConfigurationError::invalid_value("sensor_api.base_url", &config.base_url, e.to_string())
        })?;

        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let mut value = HeaderValue::from_str(&config.api_key).map_err(|e| {
                ConfigurationError::invalid_value("sensor_api.api_key", "[MASKED]", e.to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ConfigurationError::validation_error(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl SensorTransport for HttpSensorTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        form: &FormPayload,
    ) -> Result<TransportResponse, TransportError> {
        let url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid endpoint '{endpoint}': {e}")))?;

        debug!(url = %url, fields = form.len(), "Posting sensor API form");

        let response = self.client.post(url).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }
}

impl fmt::Debug for HttpSensorTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSensorTransport")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}
