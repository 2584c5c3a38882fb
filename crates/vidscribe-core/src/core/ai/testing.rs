//! In-memory provider that replays a scripted sequence of attempt outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::provider::{
    AttemptFailure, FailureClass, GenerationRequest, ProviderReply, ReportedUsage, VisionProvider,
};
use super::providers::ProviderKind;
use super::retry::BackoffStrategy;

pub(crate) type Outcome = Result<ProviderReply, AttemptFailure>;

pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    backoff: BackoffStrategy,
    secret: Option<String>,
    script: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<(Instant, GenerationRequest)>>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            kind: ProviderKind::OpenAICompatible,
            backoff: BackoffStrategy::Fixed,
            secret: None,
            script: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl VisionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn backoff(&self) -> BackoffStrategy {
        self.backoff
    }

    fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    async fn attempt(&self, request: &GenerationRequest) -> Outcome {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AttemptFailure::new(
                FailureClass::ProviderReported,
                "script exhausted",
            ))
        })
    }
}

pub(crate) fn reply(text: &str, prompt_tokens: u64, completion_tokens: u64) -> Outcome {
    Ok(ProviderReply {
        text: text.to_string(),
        usage: Some(ReportedUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }),
    })
}

pub(crate) fn failure(class: FailureClass) -> Outcome {
    Err(AttemptFailure::new(class, format!("simulated {}", class)))
}

/// Lets a test keep a handle on the provider after handing it to a client.
#[async_trait]
impl VisionProvider for std::sync::Arc<ScriptedProvider> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn kind(&self) -> ProviderKind {
        self.as_ref().kind()
    }

    fn backoff(&self) -> BackoffStrategy {
        self.as_ref().backoff()
    }

    fn secret(&self) -> Option<&str> {
        self.as_ref().secret()
    }

    async fn attempt(&self, request: &GenerationRequest) -> Outcome {
        self.as_ref().attempt(request).await
    }
}
