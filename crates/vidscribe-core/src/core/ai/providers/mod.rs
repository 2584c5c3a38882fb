//! Vision Provider Implementations
//!
//! Concrete implementations of the VisionProvider trait, one per backend family.

mod chat_completions;
mod gemini;
mod http;
mod local;
mod mistral;
mod openai;

#[cfg(test)]
pub(crate) mod stub_server;

pub use gemini::GeminiProvider;
pub use local::LocalDaemonProvider;
pub use mistral::MistralProvider;
pub use openai::OpenAICompatibleProvider;

use serde::{Deserialize, Serialize};

use super::provider::VisionProvider;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Provider Configuration
// =============================================================================

/// Supported backend families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Local Ollama daemon
    #[serde(rename = "ollama")]
    LocalDaemon,
    /// Any OpenAI-compatible chat-completions endpoint (OpenAI, OpenRouter, ...)
    #[serde(rename = "openai_api")]
    OpenAICompatible,
    /// Google generative-language API
    #[serde(rename = "google_api")]
    Gemini,
    /// Mistral multimodal chat API
    #[serde(rename = "mistral_api")]
    Mistral,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::LocalDaemon,
        ProviderKind::OpenAICompatible,
        ProviderKind::Gemini,
        ProviderKind::Mistral,
    ];

    /// Configuration key of this client
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::LocalDaemon => "ollama",
            ProviderKind::OpenAICompatible => "openai_api",
            ProviderKind::Gemini => "google_api",
            ProviderKind::Mistral => "mistral_api",
        }
    }

    /// Hosted providers authenticate with an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::LocalDaemon)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(ProviderKind::LocalDaemon),
            "openai_api" | "openai" | "openrouter" => Ok(ProviderKind::OpenAICompatible),
            "google_api" | "gemini" | "google" => Ok(ProviderKind::Gemini),
            "mistral_api" | "mistral" => Ok(ProviderKind::Mistral),
            _ => Err(CoreError::Config(format!("Unknown client type: {}", s))),
        }
    }
}

/// Immutable configuration an inference client is built from
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    /// Required for hosted providers
    pub api_key: Option<String>,
    pub default_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Creates a local (Ollama) provider config
    pub fn local(base_url: Option<&str>) -> Self {
        Self {
            kind: ProviderKind::LocalDaemon,
            base_url: base_url
                .unwrap_or(LocalDaemonProvider::DEFAULT_BASE_URL)
                .to_string(),
            api_key: None,
            default_model: LocalDaemonProvider::DEFAULT_MODEL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Creates an OpenAI-compatible provider config
    pub fn openai_compatible(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            kind: ProviderKind::OpenAICompatible,
            base_url: base_url
                .unwrap_or(OpenAICompatibleProvider::DEFAULT_BASE_URL)
                .to_string(),
            api_key: Some(api_key.to_string()),
            default_model: OpenAICompatibleProvider::DEFAULT_MODEL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Creates a Google Gemini provider config
    pub fn gemini(api_key: &str) -> Self {
        Self {
            kind: ProviderKind::Gemini,
            base_url: GeminiProvider::DEFAULT_BASE_URL.to_string(),
            api_key: Some(api_key.to_string()),
            default_model: GeminiProvider::DEFAULT_MODEL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Creates a Mistral provider config
    pub fn mistral(api_key: &str) -> Self {
        Self {
            kind: ProviderKind::Mistral,
            base_url: MistralProvider::DEFAULT_BASE_URL.to_string(),
            api_key: Some(api_key.to_string()),
            default_model: MistralProvider::DEFAULT_MODEL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the model
    pub fn with_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    /// Sets the base URL
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Sets the request timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Fails before any network call when a required credential or endpoint
    /// is missing.
    pub fn validate(&self) -> CoreResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::Config(format!(
                "api_url is required for {} client",
                self.kind
            )));
        }
        if self.kind.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(CoreError::Config(format!(
                "api_key is required for {} client",
                self.kind
            )));
        }
        if self.default_model.trim().is_empty() {
            return Err(CoreError::Config(format!(
                "model is required for {} client",
                self.kind
            )));
        }
        Ok(())
    }

    pub(crate) fn trimmed_base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }

    pub(crate) fn required_api_key(&self) -> CoreResult<String> {
        self.validate()?;
        Ok(self.api_key.clone().unwrap_or_default())
    }
}

// =============================================================================
// Provider Factory
// =============================================================================

/// Creates a vision provider from configuration
pub fn create_provider(config: ProviderConfig) -> CoreResult<Box<dyn VisionProvider>> {
    match config.kind {
        ProviderKind::LocalDaemon => Ok(Box::new(LocalDaemonProvider::new(config)?)),
        ProviderKind::OpenAICompatible => Ok(Box::new(OpenAICompatibleProvider::new(config)?)),
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(config)?)),
        ProviderKind::Mistral => Ok(Box::new(MistralProvider::new(config)?)),
    }
}

// =============================================================================
// Tests
// =============================================================================
