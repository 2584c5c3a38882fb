//! Pipeline Module
//!
//! Sequences capture, frame analysis and reconstruction for one video,
//! resuming from any stage, and writes the result document.

pub mod artifacts;
pub mod orchestrator;
pub mod result;

pub use artifacts::ArtifactStore;
pub use orchestrator::PipelineOrchestrator;
pub use result::{PipelineResult, RunMetadata};

use std::path::{Path, PathBuf};

use crate::core::analysis::GenerationOptions;
use crate::core::media::SamplingPlan;
use crate::core::settings::AnalyzerSettings;
use crate::core::Stage;

/// Result document name inside the output directory
pub const RESULT_FILE: &str = "analysis.json";

/// Working directory name inside the output directory
pub const WORK_DIR: &str = "work";

/// Everything one run needs besides its collaborators
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub video_path: PathBuf,
    pub work_dir: PathBuf,
    pub output_path: PathBuf,
    pub start_stage: Stage,
    pub sampling: SamplingPlan,
    pub user_prompt: String,
    pub keep_artifacts: bool,
    pub generation: GenerationOptions,
    /// `None` when transcription is disabled
    pub whisper_model: Option<String>,
}

impl PipelineOptions {
    pub fn new(video_path: impl Into<PathBuf>, output_dir: &Path) -> Self {
        Self {
            video_path: video_path.into(),
            work_dir: output_dir.join(WORK_DIR),
            output_path: output_dir.join(RESULT_FILE),
            start_stage: Stage::Capture,
            sampling: SamplingPlan::default(),
            user_prompt: String::new(),
            keep_artifacts: false,
            generation: GenerationOptions::default(),
            whisper_model: None,
        }
    }

    /// Run options for `video_path` under the settings' output directory.
    pub fn from_settings(settings: &AnalyzerSettings, video_path: impl Into<PathBuf>) -> Self {
        let selected = settings.clients.get(settings.clients.default);
        let mut options = Self::new(video_path, &settings.output_dir);
        options.sampling = SamplingPlan {
            frames_per_minute: f64::from(settings.frames.per_minute),
            duration: settings.duration,
            max_frames: settings.frames.max_count,
        };
        options.user_prompt = settings.prompt.clone();
        options.keep_artifacts = settings.keep_frames;
        options.generation = GenerationOptions {
            model: selected.model.clone(),
            temperature: settings.generation.temperature,
            max_output_tokens: settings.generation.max_tokens,
            stream: settings.generation.stream,
        };
        options.whisper_model = settings
            .transcription_enabled()
            .then(|| settings.audio.whisper_model.clone());
        options
    }

    pub fn with_start_stage(mut self, stage: Stage) -> Self {
        self.start_stage = stage;
        self
    }
}
