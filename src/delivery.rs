//! # Record Delivery
//!
//! Writes [`Payload`]s to the remote `sensor_readings` table with bounded retries.
//!
//! ## Layers
//! - [`RecordSink`]: one HTTP exchange, no policy. [`RestSink`] is the reqwest
//!   implementation speaking the PostgREST dialect (apikey + bearer headers,
//!   `Prefer: return=minimal`).
//! - [`DeliveryClient`]: decides what a response means and whether to try again.
//!
//! ## Retry Policy
//! - **Transport failure** (connect error, timeout): retried
//! - **2xx**: delivered
//! - **400/422, 401, 403, 404**: permanent, returned at once. A payload the
//!   server refuses will be refused again, so it is neither retried nor buffered
//! - **Any other status** (408, 409, 413, 429, 5xx, ...): retried, then buffered
//!
//! Attempts are separated by a fixed delay.

use crate::config::{DeliveryConfig, EndpointConfig};
use crate::Payload;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure below the HTTP status level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Client could not be built (bad header value, TLS setup)
    #[error("sink setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SinkError::Timeout(e.to_string())
        } else {
            SinkError::Transport(e.to_string())
        }
    }
}

/// Status line and body of an HTTP exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

/// One round trip to the data store.
pub trait RecordSink {
    /// POST one payload.
    fn insert(&self, payload: &Payload)
        -> impl Future<Output = Result<SinkResponse, SinkError>>;

    /// Read-only request used to check reachability and credentials.
    fn probe(&self) -> impl Future<Output = Result<SinkResponse, SinkError>>;
}

/// PostgREST endpoint reached over HTTPS.
pub struct RestSink {
    client: reqwest::Client,
    url: String,
}

impl RestSink {
    pub fn new(config: &EndpointConfig) -> Result<Self, SinkError> {
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| SinkError::Setup(format!("api key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| SinkError::Setup(format!("api key: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SinkError::Setup(e.to_string()))?;

        Ok(RestSink {
            client,
            url: config.url.clone(),
        })
    }

    async fn read(response: reqwest::Response) -> SinkResponse {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        SinkResponse { status, body }
    }
}

impl RecordSink for RestSink {
    async fn insert(&self, payload: &Payload) -> Result<SinkResponse, SinkError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            // Don't return the inserted row
            .header("Prefer", "return=minimal")
            .json(payload)
            .send()
            .await?;
        Ok(Self::read(response).await)
    }

    async fn probe(&self) -> Result<SinkResponse, SinkError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("select", "created_at"), ("limit", "1")])
            .send()
            .await?;
        Ok(Self::read(response).await)
    }
}

/// Why the server refused a payload for good.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    Authentication,
    Permission,
    NotFound,
    MalformedPayload,
}

impl RejectReason {
    /// `None` for statuses that may succeed on a later attempt.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(RejectReason::Authentication),
            403 => Some(RejectReason::Permission),
            404 => Some(RejectReason::NotFound),
            400 | 422 => Some(RejectReason::MalformedPayload),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::Authentication => "authentication failed, check the API key",
            RejectReason::Permission => "permission denied, check table policies",
            RejectReason::NotFound => "table or endpoint not found",
            RejectReason::MalformedPayload => "payload rejected as malformed",
        })
    }
}

/// Outcome of a delivery that did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// Server refused the payload; retrying cannot help
    #[error("{reason} (HTTP {status}): {body}")]
    Rejected {
        status: u16,
        reason: RejectReason,
        body: String,
    },

    /// Every attempt hit a transient failure
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Rejected { .. })
    }
}

enum Attempt {
    Delivered,
    Retry(String),
    Permanent(DeliveryError),
}

fn classify(result: Result<SinkResponse, SinkError>) -> Attempt {
    match result {
        Ok(response) if (200..300).contains(&response.status) => Attempt::Delivered,
        Ok(response) => match RejectReason::from_status(response.status) {
            Some(reason) => Attempt::Permanent(DeliveryError::Rejected {
                status: response.status,
                reason,
                body: response.body,
            }),
            None => Attempt::Retry(format!("HTTP {}: {}", response.status, response.body)),
        },
        Err(e) => Attempt::Retry(e.to_string()),
    }
}

/// Delivers payloads through a [`RecordSink`] with bounded retries.
pub struct DeliveryClient<S> {
    sink: S,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<S: RecordSink> DeliveryClient<S> {
    pub fn new(sink: S, config: &DeliveryConfig) -> Self {
        DeliveryClient {
            sink,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Deliver with up to `max_attempts` tries.
    pub async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError> {
        self.deliver_with(payload, self.max_attempts).await
    }

    /// Deliver with exactly one try; used when replaying buffered payloads.
    pub async fn deliver_once(&self, payload: &Payload) -> Result<(), DeliveryError> {
        self.deliver_with(payload, 1).await
    }

    async fn deliver_with(&self, payload: &Payload, attempts: u32) -> Result<(), DeliveryError> {
        let mut last = String::new();
        for attempt in 1..=attempts {
            match classify(self.sink.insert(payload).await) {
                Attempt::Delivered => {
                    debug!("Payload {} delivered on attempt {}", payload.created_at, attempt);
                    return Ok(());
                }
                Attempt::Permanent(e) => return Err(e),
                Attempt::Retry(reason) => {
                    if attempt < attempts {
                        warn!(
                            "Delivery attempt {}/{} failed: {}; retrying in {:?}",
                            attempt, attempts, reason, self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last = reason;
                }
            }
        }
        Err(DeliveryError::Exhausted { attempts, last })
    }

    /// Probe the endpoint once; true only on HTTP 200.
    pub async fn test_connectivity(&self) -> bool {
        match self.sink.probe().await {
            Ok(response) if response.status == 200 => true,
            Ok(response) => {
                match RejectReason::from_status(response.status) {
                    Some(reason) => warn!(
                        "Connectivity probe returned HTTP {} ({}): {}",
                        response.status, reason, response.body
                    ),
                    None => warn!(
                        "Connectivity probe returned HTTP {}: {}",
                        response.status, response.body
                    ),
                }
                false
            }
            Err(e) => {
                warn!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}
