//! Frame Analysis Module
//!
//! Drives one inference client across the captured frames and reconstructs
//! the final video description.

pub mod analyzer;
pub mod prompts;

pub use analyzer::FrameAnalyzer;
pub use prompts::PromptTemplates;

use serde::{Deserialize, Serialize};

use crate::core::ai::{GenerationRequest, TokenUsage};
use crate::core::{CoreResult, Frame};

/// Model response for one frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub frame: Frame,
    #[serde(rename = "response")]
    pub response_text: String,
    pub usage: TokenUsage,
}

/// Synthesized description of the whole video
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoDescription {
    pub response: String,
    pub usage: TokenUsage,
}

/// Receives each frame analysis as soon as it is produced
pub trait FrameArtifactSink: Send + Sync {
    fn record(&self, analysis: &FrameAnalysis) -> CoreResult<()>;
}

/// Sampling parameters shared by every call of a run
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOptions {
    /// Empty selects the client's default model
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub stream: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: GenerationRequest::DEFAULT_TEMPERATURE,
            max_output_tokens: GenerationRequest::DEFAULT_MAX_OUTPUT_TOKENS,
            stream: false,
        }
    }
}

impl GenerationOptions {
    pub fn request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt, &self.model)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens)
            .with_stream(self.stream)
    }
}
