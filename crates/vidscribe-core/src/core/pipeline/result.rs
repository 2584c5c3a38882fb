//! Persisted result document of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ai::UsageSummary;
use crate::core::analysis::{FrameAnalysis, VideoDescription};
use crate::core::{RunId, Stage, TimeSec, Transcript};

/// Run parameters recorded whichever stages ran
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub provider: String,
    pub model: String,
    pub whisper_model: Option<String>,
    pub frames_per_minute: f64,
    pub duration_processed: Option<TimeSec>,
    pub frames_extracted: usize,
    pub frames_processed: usize,
    pub start_stage: Stage,
    pub audio_language: Option<String>,
    pub transcription_successful: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub metadata: RunMetadata,
    pub transcript: Option<Transcript>,
    pub frame_analyses: Vec<FrameAnalysis>,
    pub token_usage: UsageSummary,
    pub video_description: Option<VideoDescription>,
}

impl PipelineResult {
    /// Sums every frame call plus the reconstruction call.
    pub fn aggregate_usage(
        analyses: &[FrameAnalysis],
        description: Option<&VideoDescription>,
    ) -> UsageSummary {
        let mut summary = UsageSummary::from_usages(analyses.iter().map(|a| &a.usage));
        if let Some(description) = description {
            summary.add(&description.usage);
        }
        summary
    }
}
