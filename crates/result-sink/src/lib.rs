//! Result Sink
//!
//! Forwards analysis records and SOS events to the trip backend:
//! - `POST {base}/trips/{trip_id}/ai-results`
//! - `POST {base}/trips/{trip_id}/sos`
//!
//! Delivery is best effort. Failures come back as a `CallbackStatus`, never as errors.

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sink construction errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Backend forwarding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Backend base URL
    pub backend_base_url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Disable to keep results in-process
    pub enabled: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:5000".to_string(),
            timeout_secs: 5,
            enabled: true,
        }
    }
}

/// Outcome of one forwarding attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStatus {
    pub sent: bool,
    pub message: String,
}

impl CallbackStatus {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            sent: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            sent: false,
            message: message.into(),
        }
    }
}

/// Destination for per-frame results and SOS events
pub trait ResultSink: Send + Sync {
    /// Forward an analysis record; skipped without a trip
    fn forward_result<'a>(&'a self, trip_id: Option<&'a str>, record: &'a Value) -> BoxFuture<'a, CallbackStatus>;

    /// Forward an SOS event; skipped without a trip
    fn forward_sos<'a>(&'a self, trip_id: Option<&'a str>, event: &'a Value) -> BoxFuture<'a, CallbackStatus>;
}

fn present(trip_id: Option<&str>) -> Option<&str> {
    trip_id.filter(|t| !t.is_empty())
}

/// Sink that posts JSON to the trip backend
pub struct HttpSink {
    client: Client,
    base: Url,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let base = Url::parse(&config.backend_base_url).map_err(|e| SinkError::InvalidUrl {
            url: config.backend_base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(SinkError::InvalidUrl {
                url: config.backend_base_url.clone(),
                reason: "not a base URL".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!("Forwarding results to {}", base);
        Ok(Self { client, base })
    }

    /// `{base}/trips/{trip_id}/{leaf}`, with the trip id as one encoded segment
    pub fn endpoint(&self, trip_id: &str, leaf: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["trips", trip_id, leaf]);
        }
        url
    }

    async fn post(&self, url: Url, body: &Value, success: &str) -> CallbackStatus {
        let kind = url.path_segments().and_then(|s| s.last()).unwrap_or("").to_string();
        let status = match self.client.post(url.clone()).json(body).send().await {
            Ok(response) if response.status().is_success() => CallbackStatus::sent(success),
            Ok(response) => {
                CallbackStatus::failed(format!("backend returned {}", response.status().as_u16()))
            }
            Err(e) => CallbackStatus::failed(e.to_string()),
        };

        if status.sent {
            debug!("Delivered to {}", url);
        } else {
            warn!("Delivery to {} failed: {}", url, status.message);
            metrics::counter!("sink_failures_total", "endpoint" => kind).increment(1);
        }
        status
    }
}

impl ResultSink for HttpSink {
    fn forward_result<'a>(&'a self, trip_id: Option<&'a str>, record: &'a Value) -> BoxFuture<'a, CallbackStatus> {
        Box::pin(async move {
            let Some(trip_id) = present(trip_id) else {
                return CallbackStatus::failed("trip_id missing; callback skipped");
            };
            self.post(self.endpoint(trip_id, "ai-results"), record, "sent").await
        })
    }

    fn forward_sos<'a>(&'a self, trip_id: Option<&'a str>, event: &'a Value) -> BoxFuture<'a, CallbackStatus> {
        Box::pin(async move {
            let Some(trip_id) = present(trip_id) else {
                return CallbackStatus::failed("trip_id missing");
            };
            self.post(self.endpoint(trip_id, "sos"), event, "SOS sent").await
        })
    }
}

/// Sink used when forwarding is switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSink;

impl ResultSink for DisabledSink {
    fn forward_result<'a>(&'a self, trip_id: Option<&'a str>, _record: &'a Value) -> BoxFuture<'a, CallbackStatus> {
        Box::pin(async move {
            match present(trip_id) {
                Some(_) => CallbackStatus::failed("backend forwarding disabled"),
                None => CallbackStatus::failed("trip_id missing; callback skipped"),
            }
        })
    }

    fn forward_sos<'a>(&'a self, _trip_id: Option<&'a str>, _event: &'a Value) -> BoxFuture<'a, CallbackStatus> {
        Box::pin(async { CallbackStatus::failed("backend forwarding disabled") })
    }
}

/// Build the sink selected by `config`
pub fn from_config(config: &SinkConfig) -> Result<Box<dyn ResultSink>, SinkError> {
    if config.enabled {
        Ok(Box::new(HttpSink::new(config)?))
    } else {
        info!("Backend forwarding disabled");
        Ok(Box::new(DisabledSink))
    }
}
