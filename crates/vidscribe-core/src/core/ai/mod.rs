//! AI Module
//!
//! Provider-agnostic inference over vision-capable models.

pub mod client;
pub mod cost_tracker;
pub mod provider;
pub mod providers;
pub mod redaction;
pub mod retry;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

pub use client::InferenceClient;
pub use cost_tracker::{ModelPricing, PricingTable, UsageSummary};
pub use provider::{
    AttemptFailure, FailureClass, GenerationRequest, GenerationResult, ImagePayload,
    ProviderReply, ReportedUsage, TokenUsage, VisionProvider,
};
pub use providers::{
    create_provider, GeminiProvider, LocalDaemonProvider, MistralProvider,
    OpenAICompatibleProvider, ProviderConfig, ProviderKind,
};
pub use redaction::redact_secrets;
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
