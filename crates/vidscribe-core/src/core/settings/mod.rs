//! Analyzer Settings
//!
//! Loads settings with a cascade:
//! 1. `{config_dir}/config.json` (user settings)
//! 2. `{config_dir}/default_config.json`
//! 3. built-in defaults
//!
//! Every section is `#[serde(default)]`, so partial files are fine. Loaded
//! values are always normalized; command-line overrides apply on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::ai::providers::{
    GeminiProvider, LocalDaemonProvider, MistralProvider, OpenAICompatibleProvider,
    ProviderConfig, ProviderKind,
};
use crate::core::ai::RetryPolicy;
use crate::core::{CoreError, CoreResult};

/// User settings file name
pub const CONFIG_FILE: &str = "config.json";

/// Fallback settings file name
pub const DEFAULT_CONFIG_FILE: &str = "default_config.json";

/// Whisper model value that turns transcription off
pub const WHISPER_DISABLED: &str = "none";

// =============================================================================
// Settings Types
// =============================================================================

/// Everything one analysis run is configured with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerSettings {
    pub clients: ClientsSettings,
    pub prompts: PromptSettings,
    /// Question the user wants answered about the video
    pub prompt: String,
    #[serde(alias = "output_dir")]
    pub output_dir: PathBuf,
    /// Keep frames and other work-dir artifacts after the run
    #[serde(alias = "keep_frames")]
    pub keep_frames: bool,
    /// Only process the first `duration` seconds
    pub duration: Option<f64>,
    pub frames: FrameSettings,
    pub audio: AudioSettings,
    pub generation: GenerationSettings,
    pub retry: RetrySettings,
    #[serde(alias = "request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            clients: ClientsSettings::default(),
            prompts: PromptSettings::default(),
            prompt: String::new(),
            output_dir: PathBuf::from("output"),
            keep_frames: false,
            duration: None,
            frames: FrameSettings::default(),
            audio: AudioSettings::default(),
            generation: GenerationSettings::default(),
            retry: RetrySettings::default(),
            request_timeout_secs: ProviderConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Per-client connection settings, keyed like the client names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientsSettings {
    /// Client used for this run
    pub default: ProviderKind,
    pub ollama: ClientSettings,
    pub openai_api: ClientSettings,
    pub google_api: ClientSettings,
    pub mistral_api: ClientSettings,
}

impl Default for ClientsSettings {
    fn default() -> Self {
        Self {
            default: ProviderKind::LocalDaemon,
            ollama: ClientSettings::for_kind(ProviderKind::LocalDaemon),
            openai_api: ClientSettings::for_kind(ProviderKind::OpenAICompatible),
            google_api: ClientSettings::for_kind(ProviderKind::Gemini),
            mistral_api: ClientSettings::for_kind(ProviderKind::Mistral),
        }
    }
}

impl ClientsSettings {
    pub fn get(&self, kind: ProviderKind) -> &ClientSettings {
        match kind {
            ProviderKind::LocalDaemon => &self.ollama,
            ProviderKind::OpenAICompatible => &self.openai_api,
            ProviderKind::Gemini => &self.google_api,
            ProviderKind::Mistral => &self.mistral_api,
        }
    }

    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ClientSettings {
        match kind {
            ProviderKind::LocalDaemon => &mut self.ollama,
            ProviderKind::OpenAICompatible => &mut self.openai_api,
            ProviderKind::Gemini => &mut self.google_api,
            ProviderKind::Mistral => &mut self.mistral_api,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    #[serde(alias = "api_key")]
    pub api_key: Option<String>,
    #[serde(alias = "api_url")]
    pub api_url: String,
    pub model: String,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ClientSettings {
    fn for_kind(kind: ProviderKind) -> Self {
        let (api_url, model) = match kind {
            ProviderKind::LocalDaemon => (
                LocalDaemonProvider::DEFAULT_BASE_URL,
                LocalDaemonProvider::DEFAULT_MODEL,
            ),
            ProviderKind::OpenAICompatible => (
                OpenAICompatibleProvider::DEFAULT_BASE_URL,
                OpenAICompatibleProvider::DEFAULT_MODEL,
            ),
            ProviderKind::Gemini => (GeminiProvider::DEFAULT_BASE_URL, GeminiProvider::DEFAULT_MODEL),
            ProviderKind::Mistral => {
                (MistralProvider::DEFAULT_BASE_URL, MistralProvider::DEFAULT_MODEL)
            }
        };
        Self {
            api_key: None,
            api_url: api_url.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    /// Directory holding `frame_analysis.txt` / `describe.txt` overrides
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameSettings {
    #[serde(alias = "per_minute")]
    pub per_minute: u32,
    #[serde(alias = "max_count")]
    pub max_count: Option<usize>,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            per_minute: 60,
            max_count: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// `none` disables transcription
    #[serde(alias = "whisper_model")]
    pub whisper_model: String,
    /// Language hint; detected when absent
    pub language: Option<String>,
    pub device: String,
    /// Transcriber executable
    pub command: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            whisper_model: "medium".to_string(),
            language: None,
            device: "cpu".to_string(),
            command: "whisper".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub temperature: f32,
    #[serde(alias = "max_tokens")]
    pub max_tokens: u32,
    /// Streaming forfeits usage accounting
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 256,
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    #[serde(alias = "max_attempts")]
    pub max_attempts: u32,
    #[serde(alias = "fixed_wait_secs")]
    pub fixed_wait_secs: f64,
    #[serde(alias = "backoff_seed_secs")]
    pub backoff_seed_secs: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fixed_wait_secs: 25.0,
            backoff_seed_secs: 2.0,
        }
    }
}

// =============================================================================
// Normalization / Resolution
// =============================================================================

impl AnalyzerSettings {
    /// Corrects out-of-range values instead of failing.
    pub fn normalize(&mut self) {
        let defaults = AnalyzerSettings::default();

        for kind in ProviderKind::ALL {
            let fallback = ClientSettings::for_kind(kind);
            let client = self.clients.get_mut(kind);
            if client.model.trim().is_empty() {
                client.model = fallback.model;
            }
            client.api_url = client.api_url.trim().to_string();
            if client
                .api_key
                .as_deref()
                .is_some_and(|k| k.trim().is_empty())
            {
                client.api_key = None;
            }
        }

        self.duration = self.duration.filter(|d| d.is_finite() && *d > 0.0);

        self.frames.per_minute = self.frames.per_minute.clamp(1, 600);
        self.frames.max_count = self.frames.max_count.filter(|n| *n > 0);

        let audio = &mut self.audio;
        audio.whisper_model = audio.whisper_model.trim().to_string();
        if audio.whisper_model.is_empty() {
            audio.whisper_model = defaults.audio.whisper_model.clone();
        }
        audio.language = audio
            .language
            .take()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if audio.command.trim().is_empty() {
            audio.command = defaults.audio.command.clone();
        }

        let generation = &mut self.generation;
        generation.temperature = if generation.temperature.is_finite() {
            generation.temperature.clamp(0.0, 2.0)
        } else {
            defaults.generation.temperature
        };
        if generation.max_tokens == 0 {
            generation.max_tokens = defaults.generation.max_tokens;
        }

        self.retry.max_attempts = self.retry.max_attempts.clamp(1, 10);
        self.retry.fixed_wait_secs =
            clamp_secs(self.retry.fixed_wait_secs, defaults.retry.fixed_wait_secs);
        self.retry.backoff_seed_secs =
            clamp_secs(self.retry.backoff_seed_secs, defaults.retry.backoff_seed_secs);

        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 3600);
    }

    /// Resolves the selected client into a validated provider config.
    pub fn provider_config(&self) -> CoreResult<ProviderConfig> {
        let kind = self.clients.default;
        let client = self.clients.get(kind);

        let config = ProviderConfig {
            kind,
            base_url: client.api_url.clone(),
            api_key: client.api_key.clone(),
            default_model: client.model.clone(),
            timeout_secs: self.request_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Clamps waits again since the fields may be set without `normalize`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetrySettings::default();
        RetryPolicy::new(
            self.retry.max_attempts.clamp(1, 10),
            Duration::from_secs_f64(clamp_secs(self.retry.fixed_wait_secs, defaults.fixed_wait_secs)),
            Duration::from_secs_f64(clamp_secs(
                self.retry.backoff_seed_secs,
                defaults.backoff_seed_secs,
            )),
        )
    }

    pub fn transcription_enabled(&self) -> bool {
        !self.audio.whisper_model.eq_ignore_ascii_case(WHISPER_DISABLED)
    }
}

fn clamp_secs(value: f64, fallback: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return fallback;
    }
    value.min(600.0)
}

// =============================================================================
// Overrides
// =============================================================================

/// Values given on the command line. `None` leaves the loaded setting alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub client: Option<ProviderKind>,
    pub ollama_url: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub prompt: Option<String>,
    pub duration: Option<f64>,
    pub keep_frames: bool,
    pub whisper_model: Option<String>,
    pub language: Option<String>,
    pub device: Option<String>,
    pub stream: bool,
}

impl SettingsOverrides {
    /// Applies overrides. Client-specific values go to the selected client.
    pub fn apply(&self, settings: &mut AnalyzerSettings) {
        if let Some(kind) = self.client {
            settings.clients.default = kind;
        }
        if let Some(url) = &self.ollama_url {
            settings.clients.ollama.api_url = url.clone();
        }

        let selected = settings.clients.get_mut(settings.clients.default);
        if let Some(key) = &self.api_key {
            selected.api_key = Some(key.clone());
        }
        if let Some(url) = &self.api_url {
            selected.api_url = url.clone();
        }
        if let Some(model) = &self.model {
            selected.model = model.clone();
        }

        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(prompt) = &self.prompt {
            settings.prompt = prompt.clone();
        }
        if self.duration.is_some() {
            settings.duration = self.duration;
        }
        if self.keep_frames {
            settings.keep_frames = true;
        }
        if let Some(model) = &self.whisper_model {
            settings.audio.whisper_model = model.clone();
        }
        if let Some(language) = &self.language {
            settings.audio.language = Some(language.clone());
        }
        if let Some(device) = &self.device {
            settings.audio.device = device.clone();
        }
        if self.stream {
            settings.generation.stream = true;
        }

        settings.normalize();
    }
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Loads settings from a config directory
pub struct SettingsManager {
    config_dir: PathBuf,
}

impl SettingsManager {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Loads the first settings file found, or defaults when there is none.
    ///
    /// A file that exists but does not parse is a configuration error.
    pub fn load(&self) -> CoreResult<AnalyzerSettings> {
        for name in [CONFIG_FILE, DEFAULT_CONFIG_FILE] {
            let path = self.config_dir.join(name);
            if !path.exists() {
                continue;
            }

            debug!("Loading settings from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let mut settings: AnalyzerSettings = serde_json::from_str(&content).map_err(|e| {
                CoreError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            settings.normalize();
            return Ok(settings);
        }

        info!(
            "No settings file in {}, using defaults",
            self.config_dir.display()
        );
        Ok(AnalyzerSettings::default())
    }
}
