//! Accrual Service REST Client
//!
//! Asks the external accrual service about a single order:
//!
//! ```text
//! GET {base}/api/orders/{number}
//! ```
//!
//! Every response is classified into an [`AccrualOutcome`]. The client makes
//! exactly one request per call and never retries; backoff and cooldown are
//! the scheduler's job.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use loyalty_domain::{AccrualOutcome, AccrualStatus, Amount, OrderNumber};
use loyalty_engine::AccrualPort;

// =============================================================================
// Constants
// =============================================================================

/// Default request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur while building the client.
///
/// Request-time failures are never errors; they become outcomes.
#[derive(Debug, Clone, Error)]
pub enum AccrualClientError {
    /// Base address is not a usable http(s) URL
    #[error("Invalid accrual base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// Address as configured
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

// =============================================================================
// Wire types
// =============================================================================

/// Body of a 200 response.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
    order: String,
    status: AccrualStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RetryAfterBody {
    retry_after: u64,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the accrual service.
#[derive(Debug, Clone)]
pub struct AccrualRestClient {
    /// Pooled HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Deadline for the whole exchange (send and body read)
    request_timeout: Duration,
}

impl AccrualRestClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AccrualClientError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|e| AccrualClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AccrualClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .build()
            .map_err(|e| AccrualClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
            request_timeout,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    /// Query the service about one order.
    pub async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        let url = self.order_url(number);

        let exchange = async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, headers, body) = match timeout(self.request_timeout, exchange).await {
            Err(_) => {
                return AccrualOutcome::transport(format!(
                    "request timed out after {}ms",
                    self.request_timeout.as_millis()
                ))
            },
            Ok(Err(e)) => return AccrualOutcome::transport(format!("request failed: {}", e)),
            Ok(Ok(parts)) => parts,
        };

        debug!(order = %number, status = status.as_u16(), "Accrual response");
        classify(number, status, &headers, &body)
    }
}

#[async_trait]
impl AccrualPort for AccrualRestClient {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        AccrualRestClient::fetch(self, number).await
    }
}

// =============================================================================
// Response classification
// =============================================================================

fn classify(
    number: &OrderNumber,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> AccrualOutcome {
    match status {
        StatusCode::OK => parse_verdict(number, body),
        StatusCode::NO_CONTENT => AccrualOutcome::NotFound,
        StatusCode::TOO_MANY_REQUESTS => AccrualOutcome::RateLimited {
            retry_after: parse_retry_after(headers, body),
        },
        s if s.is_server_error() => AccrualOutcome::ServiceUnavailable,
        s => AccrualOutcome::transport(format!("unexpected HTTP status {}", s)),
    }
}

fn parse_verdict(number: &OrderNumber, body: &str) -> AccrualOutcome {
    let response: AccrualResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return AccrualOutcome::transport(format!("malformed response body: {}", e)),
    };

    if response.order != number.as_str() {
        return AccrualOutcome::transport(format!(
            "response is for order {}, expected {}",
            response.order, number
        ));
    }

    let amount = match response.accrual.map(Amount::from_major).transpose() {
        Ok(amount) => amount,
        Err(e) => return AccrualOutcome::transport(format!("unusable accrual: {}", e)),
    };

    AccrualOutcome::settled(response.status, amount)
}

/// Retry hint from a 429: header seconds, then a bare integer body,
/// then a JSON `{"retry_after": n}` body.
fn parse_retry_after(headers: &HeaderMap, body: &str) -> Option<Duration> {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    from_header
        .or_else(|| body.trim().parse::<u64>().ok())
        .or_else(|| serde_json::from_str::<RetryAfterBody>(body).ok().map(|b| b.retry_after))
        .map(Duration::from_secs)
}

// =============================================================================
// Tests
// =============================================================================
