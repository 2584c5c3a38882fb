//! Shared HTTP plumbing for provider variants: sending, status
//! classification, body decoding and streaming.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;

use crate::core::ai::provider::{AttemptFailure, FailureClass};
use crate::core::ai::redaction::redact_secrets;
use crate::core::ai::retry::parse_retry_after;
use crate::core::ai::streaming::{collect_text, DeltaExtractor};
use crate::core::{CoreError, CoreResult};

/// Longest error body excerpt carried into messages
const MAX_ERROR_BODY_CHARS: usize = 500;

pub(super) fn build_client(timeout_secs: u64) -> CoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Classifies a transport-level failure. The URL is stripped because it may
/// carry credentials in the query string.
pub(super) fn transport_failure(error: reqwest::Error, secret: Option<&str>) -> AttemptFailure {
    let class = if error.is_timeout() {
        FailureClass::Timeout
    } else {
        FailureClass::Network
    };
    let message = redact_secrets(&error.without_url().to_string(), secret);
    AttemptFailure::new(class, format!("Request failed: {}", message))
}

/// Sends a request; non-success statuses become classified failures carrying
/// any `Retry-After` hint.
pub(super) async fn send(
    request: reqwest::RequestBuilder,
    secret: Option<&str>,
) -> Result<reqwest::Response, AttemptFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_failure(e, secret))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let hint = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable response body>".to_string());
    let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

    Err(AttemptFailure::new(
        FailureClass::from_status(status.as_u16()),
        redact_secrets(
            &format!("API request failed with status {}: {}", status, excerpt),
            secret,
        ),
    )
    .with_retry_after(hint))
}

/// Reads the full body of a successful response.
pub(super) async fn read_body(
    response: reqwest::Response,
    secret: Option<&str>,
) -> Result<String, AttemptFailure> {
    response
        .text()
        .await
        .map_err(|e| transport_failure(e, secret))
}

/// Decodes a success body. A body that does not parse is retryable.
pub(super) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, AttemptFailure> {
    serde_json::from_str(body).map_err(|e| {
        let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        AttemptFailure::new(
            FailureClass::MalformedResponse,
            format!("Invalid JSON response ({}): {}", e, excerpt),
        )
    })
}

/// An `error` member in a success payload is terminal.
pub(super) fn provider_reported(error: &serde_json::Value) -> AttemptFailure {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    AttemptFailure::new(
        FailureClass::ProviderReported,
        format!("API error: {}", message),
    )
}

/// Consumes a line-delimited streaming body.
pub(super) async fn read_stream(
    response: reqwest::Response,
    extract: DeltaExtractor,
    secret: Option<&str>,
) -> Result<String, AttemptFailure> {
    collect_text(response.bytes_stream(), extract)
        .await
        .map_err(|e| transport_failure(e, secret))
}
