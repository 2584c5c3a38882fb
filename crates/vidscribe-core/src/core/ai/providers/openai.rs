//! OpenAI-Compatible Provider Implementation
//!
//! Generic chat-completions client usable against OpenAI, OpenRouter or any
//! endpoint speaking the same wire format.

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

// =============================================================================
// OpenAI-Compatible Provider
// =============================================================================

/// Chat-completions provider authenticated with a bearer token
pub struct OpenAICompatibleProvider {
    api_key: String,
    completions_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAICompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAICompatibleProvider")
            .field("completions_url", &self.completions_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAICompatibleProvider {
    /// Default OpenAI API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Default vision model
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";

    /// Sent as `X-Title` so aggregators can attribute traffic
    const APP_TITLE: &'static str = "vidscribe";

    /// Creates a new provider; fails without a key
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

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

/// Plain text when no image is attached, otherwise a list of parts
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

fn build_payload(request: &GenerationRequest) -> ChatCompletionPayload<'_> {
    let content = match &request.image {
        Some(image) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: &request.prompt,
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.to_data_url(),
                },
            },
        ]),
        None => MessageContent::Text(&request.prompt),
    };

    ChatCompletionPayload {
        model: &request.model,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        stream: request.stream,
        temperature: request.temperature,
        max_tokens: request.max_output_tokens,
    }
}

// =============================================================================
// VisionProvider Implementation
// =============================================================================

#[async_trait]
impl VisionProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        ProviderKind::OpenAICompatible.as_str()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAICompatible
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Fixed
    }

    fn secret(&self) -> Option<&str> {
        Some(&self.api_key)
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<ProviderReply, AttemptFailure> {
        let builder = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", Self::APP_TITLE)
            .json(&build_payload(request));
        let response = http::send(builder, self.secret()).await?;

        if request.stream {
            let text = http::read_stream(response, chat_completion_delta, self.secret()).await?;
            return Ok(ProviderReply::text_only(text));
        }

        let body = http::read_body(response, self.secret()).await?;
        parse_chat_response(&body, true)
    }
}

// =============================================================================
// Tests
// =============================================================================
