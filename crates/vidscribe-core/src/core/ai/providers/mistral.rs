//! Mistral Provider Implementation
//!
//! Multimodal chat API. Same response shape as chat-completions, but the image
//! part carries the data URL directly and no temperature is sent.

use async_trait::async_trait;
use serde::Serialize;

use super::chat_completions::parse_chat_response;
use super::http;
use super::{ProviderConfig, ProviderKind};
use crate::core::ai::provider::{
    AttemptFailure, GenerationRequest, ProviderReply, VisionProvider,
};
use crate::core::ai::retry::BackoffStrategy;
use crate::core::ai::streaming::chat_completion_delta;
use crate::core::CoreResult;

/// Mistral API provider
pub struct MistralProvider {
    api_key: String,
    completions_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for MistralProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralProvider")
            .field("completions_url", &self.completions_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl MistralProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mistral.ai/v1";
    pub const DEFAULT_MODEL: &'static str = "pixtral-12b-2409";

    pub fn new(config: ProviderConfig) -> CoreResult<Self> {
        let api_key = config.required_api_key()?;
        let client = http::build_client(config.timeout_secs)?;

        Ok(Self {
            api_key,
            completions_url: format!("{}/chat/completions", config.trimmed_base_url()),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct MultimodalPayload<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: String },
}

fn build_payload(request: &GenerationRequest) -> MultimodalPayload<'_> {
    let mut content = vec![Part::Text {
        text: &request.prompt,
    }];
    if let Some(image) = &request.image {
        content.push(Part::ImageUrl {
            image_url: image.to_data_url(),
        });
    }

    MultimodalPayload {
        model: &request.model,
        messages: vec![Message {
            role: "user",
            content,
        }],
        max_tokens: request.max_output_tokens,
        stream: request.stream,
    }
}

#[async_trait]
impl VisionProvider for MistralProvider {
    fn name(&self) -> &str {
        ProviderKind::Mistral.as_str()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential
    }

    fn secret(&self) -> Option<&str> {
        Some(&self.api_key)
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<ProviderReply, AttemptFailure> {
        let builder = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&build_payload(request));
        let response = http::send(builder, self.secret()).await?;

        if request.stream {
            let text = http::read_stream(response, chat_completion_delta, self.secret()).await?;
            return Ok(ProviderReply::text_only(text));
        }

        let body = http::read_body(response, self.secret()).await?;
        // An empty answer is as useless as a missing one here.
        parse_chat_response(&body, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::provider::{FailureClass, ImagePayload, ReportedUsage};
    use crate::core::ai::providers::stub_server::{StubResponse, StubServer};

    fn provider_for(server: &StubServer) -> MistralProvider {
        MistralProvider::new(ProviderConfig::mistral("mk-secret").with_base_url(&server.url()))
            .unwrap()
    }

    #[test]
    fn image_url_is_a_plain_data_url() {
        let request = GenerationRequest::new("What is shown?", "pixtral-12b-2409")
            .with_image(ImagePayload::new(b"abc".to_vec()))
            .with_max_output_tokens(300);
        let json = serde_json::to_value(build_payload(&request)).unwrap();
        let content = &json["messages"][0]["content"];

        assert_eq!(content[0], serde_json::json!({"type": "text", "text": "What is shown?"}));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"], "data:image/jpeg;base64,YWJj");
        assert_eq!(json["max_tokens"], 300);
        assert!(json.get("temperature").is_none());
        assert!(json.get("stream").is_none());
    }

    #[tokio::test]
    async fn parses_pixtral_response() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            r#"{"id":"1922","object":"chat.completion","model":"pixtral-12b-2409",
                "choices":[{"index":0,"message":{"role":"assistant","tool_calls":null,
                "content":"Frame 24: workers pour concrete."},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":2942,"total_tokens":3162,"completion_tokens":220}}"#,
        )])
        .await;

        let reply = provider_for(&server)
            .attempt(&GenerationRequest::new("hi", "pixtral-12b-2409"))
            .await
            .unwrap();

        assert_eq!(reply.text, "Frame 24: workers pour concrete.");
        assert_eq!(
            reply.usage,
            Some(ReportedUsage {
                prompt_tokens: 2942,
                completion_tokens: 220,
                total_tokens: 3162
            })
        );
        let request = &server.requests()[0];
        assert_eq!(request.header("authorization"), Some("Bearer mk-secret"));
    }

    #[tokio::test]
    async fn empty_content_is_missing_field() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            r#"{"choices":[{"message":{"content":""}}],"usage":{}}"#,
        )])
        .await;

        let err = provider_for(&server)
            .attempt(&GenerationRequest::new("hi", "pixtral-12b-2409"))
            .await
            .unwrap_err();
        assert_eq!(err.class, FailureClass::MissingField);
    }

    #[tokio::test]
    async fn other_4xx_is_terminal() {
        let server =
            StubServer::start(vec![StubResponse::json(422, r#"{"message":"bad model"}"#)]).await;

        let err = provider_for(&server)
            .attempt(&GenerationRequest::new("hi", "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.class, FailureClass::ClientError);
        assert!(!err.class.is_retryable());
    }
}
