//! Chat-completions response shape shared by the OpenAI-compatible and
//! Mistral variants.

use serde::Deserialize;

use super::http::{decode, provider_reported};
use crate::core::ai::provider::{AttemptFailure, ProviderReply, ReportedUsage};

#[derive(Debug, Deserialize)]
pub(super) struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Parses a non-streaming chat-completions body.
///
/// `allow_empty` keeps an empty `content` string as a valid answer; when false
/// it is treated like a missing field.
pub(super) fn parse_chat_response(
    body: &str,
    allow_empty: bool,
) -> Result<ProviderReply, AttemptFailure> {
    let response: ChatResponse = decode(body)?;

    if let Some(error) = response.error.as_ref() {
        return Err(provider_reported(error));
    }

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| AttemptFailure::missing_field("choices[0].message.content"))?;

    if !allow_empty && content.trim().is_empty() {
        return Err(AttemptFailure::missing_field("message content"));
    }

    let usage = response.usage.unwrap_or_default();
    Ok(ProviderReply {
        text: content,
        usage: Some(ReportedUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
    })
}
