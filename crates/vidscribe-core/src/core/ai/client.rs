//! Inference Client
//!
//! Uniform `generate` entry point over one provider variant. Owns the retry
//! loop, cost accounting and per-attempt event emission.

use std::sync::Arc;

use tracing::{debug, info};

use super::cost_tracker::PricingTable;
use super::provider::{
    AttemptFailure, GenerationRequest, GenerationResult, TokenUsage, VisionProvider,
};
use super::providers::{create_provider, ProviderConfig};
use super::redaction::redact_secrets;
use super::retry::RetryPolicy;
use crate::core::events::{EventSink, PipelineEvent};
use crate::core::{CoreError, CoreResult};

/// Retrying, cost-accounting wrapper around a [`VisionProvider`].
///
/// Holds no mutable state, so one instance may serve every sequential call of
/// a run. Give each concurrent run its own client so events stay per-run.
pub struct InferenceClient {
    provider: Box<dyn VisionProvider>,
    default_model: String,
    policy: RetryPolicy,
    pricing: PricingTable,
    events: Arc<dyn EventSink>,
}

impl InferenceClient {
    pub fn new(
        provider: Box<dyn VisionProvider>,
        default_model: &str,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            provider,
            default_model: default_model.to_string(),
            policy: RetryPolicy::default(),
            pricing: PricingTable::default(),
            events,
        }
    }

    /// Validates the config and builds the matching provider variant.
    pub fn from_config(config: ProviderConfig, events: Arc<dyn EventSink>) -> CoreResult<Self> {
        let default_model = config.default_model.clone();
        let provider = create_provider(config)?;
        Ok(Self::new(provider, &default_model, events))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs one call, retrying transient failures.
    ///
    /// Streaming calls and backends that report no token counts yield an
    /// all-zero usage; use non-streaming mode when cost matters.
    ///
    /// A provider's retry hint is honored exactly up to ten minutes; longer
    /// hints are capped and logged.
    pub async fn generate(&self, mut request: GenerationRequest) -> CoreResult<GenerationResult> {
        if request.model.trim().is_empty() {
            request.model = self.default_model.clone();
        }

        let provider = self.provider.name().to_string();
        let strategy = self.provider.backoff();
        let mut attempt: u32 = 0;

        loop {
            let failure = match self.provider.attempt(&request).await {
                Ok(reply) => {
                    let usage = match reply.usage {
                        Some(reported) if !request.stream => {
                            self.pricing.compute_reported(reported, &request.model)
                        }
                        _ => TokenUsage::zero(),
                    };
                    debug!(
                        provider = %provider,
                        model = %request.model,
                        attempt = attempt + 1,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        cost = usage.cost,
                        "Inference call succeeded"
                    );
                    return Ok(GenerationResult {
                        response_text: reply.text,
                        usage,
                    });
                }
                Err(failure) => failure,
            };

            let message = redact_secrets(&failure.message, self.provider.secret());
            let decision = self
                .policy
                .decide(failure.class, attempt, failure.retry_after, strategy);

            self.events.emit(PipelineEvent::AttemptFailed {
                provider: provider.clone(),
                attempt: attempt + 1,
                max_attempts: self.policy.max_attempts,
                error_class: failure.class.to_string(),
                wait_secs: decision.wait.as_secs_f64(),
                will_retry: decision.retry,
                message: message.clone(),
            });

            if !decision.retry {
                return Err(self.terminal_error(&provider, attempt + 1, failure, message));
            }

            info!(
                provider = %provider,
                attempt = attempt + 1,
                wait_secs = decision.wait.as_secs_f64(),
                error_class = %failure.class,
                "Retrying inference call"
            );
            tokio::time::sleep(decision.wait).await;
            attempt += 1;
        }
    }

    fn terminal_error(
        &self,
        provider: &str,
        attempts: u32,
        failure: AttemptFailure,
        message: String,
    ) -> CoreError {
        if !failure.class.is_retryable() {
            return CoreError::Permanent {
                provider: provider.to_string(),
                class: failure.class,
                message,
            };
        }

        self.events.emit(PipelineEvent::RetriesExhausted {
            provider: provider.to_string(),
            attempts,
            error_class: failure.class.to_string(),
        });
        CoreError::RetriesExhausted {
            provider: provider.to_string(),
            attempts,
            class: failure.class,
            message,
        }
    }
}
