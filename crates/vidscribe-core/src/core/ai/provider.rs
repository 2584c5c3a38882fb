//! Vision Provider Module
//!
//! Defines the provider trait and the request/response types shared by every
//! backend family.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::cost_tracker::ModelPricing;
use super::providers::ProviderKind;
use super::retry::BackoffStrategy;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Vision Provider Trait
// =============================================================================

/// One backend family (Ollama, OpenAI-compatible, Gemini, Mistral).
///
/// A provider performs exactly one network round-trip per `attempt`; retries,
/// waits and cost accounting live in [`super::InferenceClient`].
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Returns the provider name
    fn name(&self) -> &str;

    /// Backend family this provider speaks
    fn kind(&self) -> ProviderKind;

    /// Wait strategy used when the provider gives no rate-limit hint
    fn backoff(&self) -> BackoffStrategy;

    /// Credential that must never appear in logs or surfaced errors
    fn secret(&self) -> Option<&str> {
        None
    }

    /// Sends one request and classifies any failure.
    async fn attempt(&self, request: &GenerationRequest) -> Result<ProviderReply, AttemptFailure>;
}

// =============================================================================
// Image Payload
// =============================================================================

/// Raw image bytes plus their MIME type
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime_type(&bytes).to_string();
        Self { bytes, mime_type }
    }

    /// Reads an image from disk. Failures are frame IO errors.
    pub async fn from_path(path: &Path) -> CoreResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|source| CoreError::FrameIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(bytes))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        // Frames are captured as JPEG.
        "image/jpeg"
    }
}

// =============================================================================
// Generation Request
// =============================================================================

/// One inference call
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Prompt text
    pub prompt: String,
    /// Optional image attached to the prompt
    pub image: Option<ImagePayload>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_output_tokens: u32,
    /// Consume the response incrementally. Streaming calls report no usage,
    /// so their cost is always zero; use non-streaming mode when cost matters.
    pub stream: bool,
}

impl GenerationRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 256;

    pub fn new(prompt: &str, model: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            image: None,
            model: model.to_string(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            stream: false,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

// =============================================================================
// Provider Reply / Generation Result
// =============================================================================

/// Token counts as reported by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// What a single successful attempt produced
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderReply {
    pub text: String,
    /// `None` when the backend reports no token counts (local daemon, streaming)
    pub usage: Option<ReportedUsage>,
}

impl ProviderReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Token usage and cost of one call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Per-1000-token rates used for `cost`
    pub model_pricing: ModelPricing,
    /// Dollars
    pub cost: f64,
}

impl TokenUsage {
    /// All-zero usage, returned when the backend reports nothing.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0
            && self.completion_tokens == 0
            && self.total_tokens == 0
            && self.cost == 0.0
    }
}

/// Result of a successful `generate` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub response_text: String,
    pub usage: TokenUsage,
}

// =============================================================================
// Attempt Failures
// =============================================================================

/// Why a single attempt failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// HTTP 429
    RateLimited,
    /// HTTP 503
    ServiceUnavailable,
    /// HTTP 502 / 504
    GatewayError,
    /// Connection refused, reset, DNS
    Network,
    /// Request or body read timed out
    Timeout,
    /// Success status but the body could not be parsed
    MalformedResponse,
    /// Any other 4xx
    ClientError,
    /// Any other 5xx
    ServerError,
    /// Parsed body lacks choices/candidates/content
    MissingField,
    /// Provider put an error object in the payload
    ProviderReported,
}

impl FailureClass {
    /// Classification is fixed per class; attempts never change it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited
                | FailureClass::ServiceUnavailable
                | FailureClass::GatewayError
                | FailureClass::Network
                | FailureClass::Timeout
                | FailureClass::MalformedResponse
        )
    }

    /// Rate-limit and network classes back off exponentially on hosted APIs.
    pub fn is_rate_limit_or_network(&self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited
                | FailureClass::ServiceUnavailable
                | FailureClass::Network
                | FailureClass::Timeout
        )
    }

    /// Maps an HTTP error status to a class.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FailureClass::RateLimited,
            503 => FailureClass::ServiceUnavailable,
            502 | 504 => FailureClass::GatewayError,
            400..=499 => FailureClass::ClientError,
            _ => FailureClass::ServerError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::RateLimited => "rate_limited",
            FailureClass::ServiceUnavailable => "service_unavailable",
            FailureClass::GatewayError => "gateway_error",
            FailureClass::Network => "network",
            FailureClass::Timeout => "timeout",
            FailureClass::MalformedResponse => "malformed_response",
            FailureClass::ClientError => "client_error",
            FailureClass::ServerError => "server_error",
            FailureClass::MissingField => "missing_field",
            FailureClass::ProviderReported => "provider_reported",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of one attempt
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptFailure {
    pub class: FailureClass,
    pub message: String,
    /// Provider wait hint (`Retry-After`)
    pub retry_after: Option<Duration>,
}

impl AttemptFailure {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, hint: Option<Duration>) -> Self {
        self.retry_after = hint;
        self
    }

    pub fn missing_field(what: &str) -> Self {
        Self::new(FailureClass::MissingField, format!("Response has no {}", what))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("Describe this frame", "gpt-4o")
            .with_image(ImagePayload::new(vec![0xFF, 0xD8, 0xFF]))
            .with_temperature(0.7)
            .with_max_output_tokens(512)
            .with_stream(true);

        assert_eq!(request.prompt, "Describe this frame");
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_output_tokens, 512);
        assert!(request.stream);
        assert_eq!(request.image.unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn test_mime_sniffing() {
        let png = ImagePayload::new(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A]);
        assert_eq!(png.mime_type, "image/png");

        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0, 0, 0, 0]);
        webp.extend_from_slice(b"WEBP");
        assert_eq!(ImagePayload::new(webp).mime_type, "image/webp");
    }

    #[test]
    fn test_data_url_encoding() {
        let image = ImagePayload::new(b"abc".to_vec());
        assert_eq!(image.to_base64(), "YWJj");
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_missing_image_is_frame_io_error() {
        let err = ImagePayload::from_path(Path::new("/nonexistent/frame_0001.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::FrameIo { .. }));
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(FailureClass::from_status(429), FailureClass::RateLimited);
        assert_eq!(FailureClass::from_status(503), FailureClass::ServiceUnavailable);
        assert_eq!(FailureClass::from_status(404), FailureClass::ClientError);
        assert_eq!(FailureClass::from_status(401), FailureClass::ClientError);
        assert_eq!(FailureClass::from_status(500), FailureClass::ServerError);

        assert!(FailureClass::RateLimited.is_retryable());
        assert!(FailureClass::ServiceUnavailable.is_retryable());
        assert!(FailureClass::Network.is_retryable());
        assert!(FailureClass::Timeout.is_retryable());
        assert!(!FailureClass::ClientError.is_retryable());
        assert!(!FailureClass::MissingField.is_retryable());
        assert!(!FailureClass::ProviderReported.is_retryable());
    }

    #[test]
    fn test_zero_usage() {
        assert!(TokenUsage::zero().is_zero());
    }
}
