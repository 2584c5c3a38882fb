//! Local Daemon Provider Implementation
//!
//! Talks to an Ollama-style `/api/generate` endpoint. The daemon reports no
//! token usage, so every call through it costs nothing.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::http;
use super::{ProviderConfig, ProviderKind};
use crate::core::ai::provider::{
    AttemptFailure, GenerationRequest, ProviderReply, VisionProvider,
};
use crate::core::ai::retry::BackoffStrategy;
use crate::core::ai::streaming::ollama_delta;
use crate::core::CoreResult;

// =============================================================================
// Local Daemon Provider
// =============================================================================

/// Local inference daemon (no credentials)
pub struct LocalDaemonProvider {
    generate_url: String,
    client: reqwest::Client,
}

impl LocalDaemonProvider {
    /// Default daemon address
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    /// Default vision model
    pub const DEFAULT_MODEL: &'static str = "llama3.2-vision";

    /// Creates a new local daemon provider
    pub fn new(config: ProviderConfig) -> CoreResult<Self> {
        config.validate()?;
        let client = http::build_client(config.timeout_secs)?;

        Ok(Self {
            generate_url: format!("{}/api/generate", config.trimmed_base_url()),
            client,
        })
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

fn build_payload(request: &GenerationRequest) -> GeneratePayload<'_> {
    GeneratePayload {
        model: &request.model,
        prompt: &request.prompt,
        stream: request.stream,
        options: GenerateOptions {
            temperature: request.temperature,
            num_predict: request.max_output_tokens,
        },
        images: request.image.as_ref().map(|image| vec![image.to_base64()]),
    }
}

/// The daemon answers `{"response": "..."}`; anything else is passed through
/// verbatim so that nothing it said is lost.
fn parse_body(body: &str) -> ProviderReply {
    let text = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("response")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    ProviderReply::text_only(text)
}

// =============================================================================
// VisionProvider Implementation
// =============================================================================

#[async_trait]
impl VisionProvider for LocalDaemonProvider {
    fn name(&self) -> &str {
        ProviderKind::LocalDaemon.as_str()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalDaemon
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Fixed
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<ProviderReply, AttemptFailure> {
        let builder = self
            .client
            .post(&self.generate_url)
            .json(&build_payload(request));
        let response = http::send(builder, None).await?;

        if request.stream {
            let text = http::read_stream(response, ollama_delta, None).await?;
            return Ok(ProviderReply::text_only(text));
        }

        let body = http::read_body(response, None).await?;
        Ok(parse_body(&body))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::provider::{FailureClass, ImagePayload};
    use crate::core::ai::providers::stub_server::{StubResponse, StubServer};

    #[test]
    fn payload_carries_options_and_image() {
        let request = GenerationRequest::new("What is shown?", "llama3.2-vision")
            .with_image(ImagePayload::new(b"abc".to_vec()));
        let json = serde_json::to_value(build_payload(&request)).unwrap();

        assert_eq!(json["model"], "llama3.2-vision");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 256);
        assert_eq!(json["images"][0], "YWJj");
    }

    #[test]
    fn text_only_payload_omits_images() {
        let request = GenerationRequest::new("Summarize", "llama3.2-vision");
        let json = serde_json::to_value(build_payload(&request)).unwrap();
        assert!(json.get("images").is_none());
    }

    #[test]
    fn response_field_is_extracted() {
        let reply = parse_body(r#"{"model":"llama3.2-vision","response":"A dog runs.","done":true}"#);
        assert_eq!(reply.text, "A dog runs.");
        assert!(reply.usage.is_none());

        let reply = parse_body("plain text answer");
        assert_eq!(reply.text, "plain text answer");
    }

    #[tokio::test]
    async fn posts_to_generate_endpoint() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            r#"{"response":"Two people talk.","done":true}"#,
        )])
        .await;
        let provider =
            LocalDaemonProvider::new(ProviderConfig::local(Some(&format!("{}/", server.url()))))
                .unwrap();

        let reply = provider
            .attempt(&GenerationRequest::new("hi", "llama3.2-vision"))
            .await
            .unwrap();

        assert_eq!(reply.text, "Two people talk.");
        let requests = server.requests();
        assert_eq!(requests[0].path, "/api/generate");
        assert!(requests[0].header("authorization").is_none());
    }

    #[tokio::test]
    async fn streaming_concatenates_deltas() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            "{\"response\":\"A cat \"}\n{\"response\":\"sleeps.\"}\n{\"done\":true}\n",
        )])
        .await;
        let provider = LocalDaemonProvider::new(ProviderConfig::local(Some(&server.url()))).unwrap();

        let reply = provider
            .attempt(&GenerationRequest::new("hi", "llama3.2-vision").with_stream(true))
            .await
            .unwrap();
        assert_eq!(reply.text, "A cat sleeps.");
        assert!(reply.usage.is_none());
    }

    #[tokio::test]
    async fn unreachable_daemon_is_network_failure() {
        let url = StubServer::closed_url().await;
        let provider = LocalDaemonProvider::new(ProviderConfig::local(Some(&url))).unwrap();

        let err = provider
            .attempt(&GenerationRequest::new("hi", "llama3.2-vision"))
            .await
            .unwrap_err();
        assert_eq!(err.class, FailureClass::Network);
    }
}
