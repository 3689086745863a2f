// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reference [`Transport`] posting batches to an HTTP collector.
//!
//! A batch is sent as one JSON array of envelopes:
//!
//! ```json
//! [{"event_id":"9f2c...","timestamp":1656581409.5,"level":"error","payload":{"message":"boom"}}]
//! ```
//!
//! Payloads that are valid JSON are embedded as-is; anything else is sent as a string.
//! The body is optionally zstd-compressed.

use crate::batch::Batch;
use crate::constants::DEFAULT_RETRY_AFTER;
use crate::error::TransportError;
use crate::event::{Event, EventId, Level};
use crate::transport::{DeliveryOutcome, Transport};
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER,
};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, warn};
use zstd::zstd_safe::CompressionLevel;

pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Collector endpoint receiving the POST requests.
    pub url: String,
    pub api_key: Option<String>,
    /// Header carrying `api_key`.
    pub api_key_header: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// zstd level; `None` sends the body uncompressed.
    pub compression_level: Option<CompressionLevel>,
    pub https_proxy: Option<String>,
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            timeout: Duration::from_secs(10),
            compression_level: None,
            https_proxy: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    compression_level: Option<CompressionLevel>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.url).map_err(|e| TransportError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)));
        if let Some(proxy) = &config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy.as_str())?);
        }
        let client = builder.build()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let invalid = || TransportError::InvalidHeader(config.api_key_header.clone());
            let name = HeaderName::from_bytes(config.api_key_header.as_bytes())
                .map_err(|_| invalid())?;
            let value = HeaderValue::from_str(api_key).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            url,
            headers,
            compression_level: config.compression_level,
        })
    }

    fn compress(&self, body: Vec<u8>) -> (Vec<u8>, bool) {
        let Some(level) = self.compression_level else {
            return (body, false);
        };
        match zstd::encode_all(body.as_slice(), level) {
            Ok(compressed) => (compressed, true),
            Err(e) => {
                warn!("Failed to compress batch, sending it uncompressed: {e}");
                (body, false)
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, batch: &Batch) -> DeliveryOutcome {
        let body = match encode_batch(batch) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::permanent(format!("failed to encode batch: {e}")),
        };
        let (body, compressed) = self.compress(body);

        let mut request = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone());
        if compressed {
            request = request.header(CONTENT_ENCODING, "zstd");
        }

        match request.body(body).send().await {
            Ok(response) => {
                let outcome = classify_response(response.status(), response.headers());
                debug!(
                    "Collector answered {} for batch {}",
                    response.status(),
                    batch.id()
                );
                outcome
            }
            Err(e) => {
                debug!("Failed to send batch {}: {e}", batch.id());
                DeliveryOutcome::retryable()
            }
        }
    }
}

/// Maps a collector response to a delivery outcome.
///
/// 2xx is delivered. 408, 429 and 5xx are retryable, with 429 honouring `Retry-After` (in
/// seconds). Every other status is permanent.
#[must_use]
pub fn classify_response(status: StatusCode, headers: &HeaderMap) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Delivered;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => DeliveryOutcome::RetryableFailure {
            retry_after: Some(retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER)),
        },
        StatusCode::REQUEST_TIMEOUT => DeliveryOutcome::retryable(),
        status if status.is_server_error() => DeliveryOutcome::retryable(),
        status => DeliveryOutcome::permanent(format!("collector answered {status}")),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Serialize)]
struct Envelope {
    event_id: EventId,
    timestamp: f64,
    level: Level,
    payload: Value,
}

impl From<&Event> for Envelope {
    fn from(event: &Event) -> Self {
        let payload = serde_json::from_slice(event.payload()).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(event.payload()).into_owned())
        });
        Self {
            event_id: event.id(),
            timestamp: event
                .timestamp()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |d| d.as_secs_f64()),
            level: event.level(),
            payload,
        }
    }
}

fn encode_batch(batch: &Batch) -> Result<Vec<u8>, serde_json::Error> {
    let envelopes: Vec<Envelope> = batch.events().iter().map(Envelope::from).collect();
    serde_json::to_vec(&envelopes)
}
