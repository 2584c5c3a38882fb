//! Google Gemini Provider Implementation
//!
//! Generative-language API. Authenticates with a `key` query parameter, so
//! every surfaced error is redacted before it leaves this module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http;
use super::{ProviderConfig, ProviderKind};
use crate::core::ai::provider::{
    AttemptFailure, GenerationRequest, ProviderReply, ReportedUsage, VisionProvider,
};
use crate::core::ai::retry::BackoffStrategy;
use crate::core::ai::streaming::gemini_delta;
use crate::core::CoreResult;

// =============================================================================
// Gemini Provider
// =============================================================================

/// Google Gemini API provider
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiProvider {
    /// Default Gemini API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    /// Default vision model
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    /// Creates a new Gemini provider; fails without a key
    pub fn new(config: ProviderConfig) -> CoreResult<Self> {
        let api_key = config.required_api_key()?;
        let client = http::build_client(config.timeout_secs)?;

        Ok(Self {
            api_key,
            base_url: config.trimmed_base_url(),
            client,
        })
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{}/models/{}/:{}", self.base_url, model, method)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPayload<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

fn build_payload(request: &GenerationRequest) -> GenerateContentPayload<'_> {
    let mut parts = vec![Part::Text {
        text: &request.prompt,
    }];
    if let Some(image) = &request.image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.to_base64(),
            },
        });
    }

    GenerateContentPayload {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        },
    }
}

fn parse_body(body: &str) -> Result<ProviderReply, AttemptFailure> {
    let response: GenerateContentResponse = http::decode(body)?;

    if let Some(error) = response.error.as_ref() {
        return Err(http::provider_reported(error));
    }

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AttemptFailure::missing_field("candidates[0].content.parts[0].text"))?;

    let usage = response.usage_metadata.unwrap_or_default();
    Ok(ProviderReply {
        text,
        usage: Some(ReportedUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }),
    })
}

// =============================================================================
// VisionProvider Implementation
// =============================================================================

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        ProviderKind::Gemini.as_str()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential
    }

    fn secret(&self) -> Option<&str> {
        Some(&self.api_key)
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<ProviderReply, AttemptFailure> {
        let mut builder = self
            .client
            .post(self.endpoint(&request.model, request.stream))
            .query(&[("key", self.api_key.as_str())]);
        if request.stream {
            builder = builder.query(&[("alt", "sse")]);
        }
        let response = http::send(builder.json(&build_payload(request)), self.secret()).await?;

        if request.stream {
            let text = http::read_stream(response, gemini_delta, self.secret()).await?;
            return Ok(ProviderReply::text_only(text));
        }

        let body = http::read_body(response, self.secret()).await?;
        parse_body(&body)
    }
}

// =============================================================================
// Tests
// =============================================================================
