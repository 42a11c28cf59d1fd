//! Outbound HTTP transport.
//!
//! `Transport` is the seam between delivery logic and the network: one JSON
//! POST with bounded timeouts, answered by a status code and body. The
//! production implementation is `DeliveryClient` on top of reqwest; tests
//! substitute a scripted transport.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
const TRUNCATED_BODY_SIZE: usize = 1024;

/// Configuration for the delivery HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed for the response once connected.
    pub read_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: format!("herald/{}", env!("CARGO_PKG_VERSION")),
            verify_tls: true,
        }
    }
}

/// One JSON POST to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Absolute destination URL.
    pub url: String,
    /// JSON body.
    pub body: Value,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Overrides the client's read timeout for this request.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// Creates a POST of `body` to `url`.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self { url: url.into(), body, headers: Vec::new(), timeout: None }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of the first header with the given name, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response to an outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers, lowercase names.
    pub headers: HashMap<String, String>,
    /// Response body (size-limited).
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

impl TransportResponse {
    /// Creates a response with no headers.
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self { status_code, headers: HashMap::new(), body: body.into(), duration: Duration::ZERO }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Converts a non-2xx response into the matching retryable error.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` for 429, `ClientError` for other 4xx, and
    /// `ServerError` for anything else outside 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        match self.status_code {
            200..=299 => Ok(self),
            429 => Err(DeliveryError::rate_limited(extract_retry_after_seconds(&self.headers))),
            400..=499 => Err(DeliveryError::client_error(self.status_code, self.body)),
            _ => Err(DeliveryError::server_error(self.status_code, self.body)),
        }
    }
}

/// Sends outbound requests.
///
/// Implementations return `Ok` for any HTTP response, success or not, and
/// `Err` only when no response was obtained.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// POSTs the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError`, `Timeout`, or `ConfigurationError` when the
    /// request could not be completed.
    async fn post(&self, request: &OutboundRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport with pooled connections.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built from the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn map_send_error(&self, error: &reqwest::Error, timeout: Duration) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(timeout)
        } else if error.is_builder() {
            DeliveryError::configuration(format!("invalid request: {error}"))
        } else if error.is_connect() {
            DeliveryError::network(format!("connection failed: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for DeliveryClient {
    async fn post(&self, request: &OutboundRequest) -> Result<TransportResponse> {
        let timeout = request.timeout.unwrap_or(self.config.read_timeout);
        let span = info_span!("http_post", url = %request.url, timeout_ms = timeout.as_millis());

        async move {
            let start_time = std::time::Instant::now();

            let mut http_request = self
                .client
                .post(&request.url)
                .timeout(self.config.connect_timeout + timeout)
                .json(&request.body);
            for (name, value) in &request.headers {
                http_request = http_request.header(name, value);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::debug!(
                        duration_ms = duration.as_millis(),
                        error = %e,
                        "request failed"
                    );
                    return Err(self.map_send_error(&e, timeout));
                },
            };

            let status_code = response.status().as_u16();
            let headers = extract_headers(response.headers());
            let body = match response.bytes().await {
                Ok(bytes) => truncate_body(&bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read response body");
                    format!("[failed to read response body: {e}]")
                },
            };
            let duration = start_time.elapsed();

            tracing::debug!(
                status = status_code,
                duration_ms = duration.as_millis(),
                "received response"
            );

            Ok(TransportResponse { status_code, headers, body, duration })
        }
        .instrument(span)
        .await
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_RESPONSE_BODY_SIZE {
        let truncated = String::from_utf8_lossy(&bytes[..TRUNCATED_BODY_SIZE]);
        format!("{truncated}... (truncated)")
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    header_map
        .iter()
        .filter_map(|(key, value)| {
            value.to_str().ok().map(|value| (key.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Extracts the retry-after delay from response headers.
///
/// Supports both delta-seconds and HTTP-date forms. An unparseable header
/// falls back to 60 seconds, a date in the past yields 0, and a missing
/// header yields `None`.
pub fn extract_retry_after_seconds<S: std::hash::BuildHasher>(
    headers: &HashMap<String, String, S>,
) -> Option<u64> {
    const DEFAULT_RETRY_AFTER: u64 = 60;

    let retry_after = headers.get("retry-after").or_else(|| headers.get("Retry-After"))?;

    if let Ok(seconds) = retry_after.trim().parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date_time) = chrono::DateTime::parse_from_rfc2822(retry_after) {
        let remaining = date_time.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return Some(remaining.to_std().map_or(0, |d| d.as_secs()));
    }

    Some(DEFAULT_RETRY_AFTER)
}
