//! Media Capture Module
//!
//! Frame sampling and audio transcription collaborators used by the capture
//! stage. Both sit behind traits so the pipeline can run against fakes.

pub mod ffmpeg;
pub mod transcriber;

pub use ffmpeg::FfmpegFrameExtractor;
pub use transcriber::{CommandTranscriber, DisabledTranscriber};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::{CoreResult, Frame, TimeSec, Transcript};

/// How frames are sampled from the source video
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingPlan {
    pub frames_per_minute: f64,
    /// Only the first `duration` seconds are processed
    pub duration: Option<TimeSec>,
    pub max_frames: Option<usize>,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self {
            frames_per_minute: 60.0,
            duration: None,
            max_frames: None,
        }
    }
}

impl SamplingPlan {
    /// Seconds between two sampled frames
    pub fn interval_secs(&self) -> f64 {
        60.0 / self.frames_per_minute.max(f64::MIN_POSITIVE)
    }

    pub fn timestamp_of(&self, index: usize) -> TimeSec {
        index as f64 * self.interval_secs()
    }
}

/// Samples still frames and the audio track out of a video file
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Writes `frame_NNNN.jpg` files into `frames_dir` and returns them in
    /// ordinal order.
    async fn extract_frames(
        &self,
        video: &Path,
        frames_dir: &Path,
        plan: &SamplingPlan,
    ) -> CoreResult<Vec<Frame>>;

    /// Writes the audio track as 16 kHz mono WAV. `None` when the video has
    /// no audio stream.
    async fn extract_audio(
        &self,
        video: &Path,
        output: &Path,
        duration: Option<TimeSec>,
    ) -> CoreResult<Option<PathBuf>>;
}

/// Turns an audio file into a transcript
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `None` when the transcript is unreliable.
    async fn transcribe(&self, audio: &Path) -> CoreResult<Option<Transcript>>;

    /// Disabled transcribers let the capture stage skip audio extraction.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_interval_follows_rate() {
        let plan = SamplingPlan {
            frames_per_minute: 30.0,
            ..SamplingPlan::default()
        };
        assert_eq!(plan.interval_secs(), 2.0);
        assert_eq!(plan.timestamp_of(3), 6.0);
        assert_eq!(SamplingPlan::default().timestamp_of(5), 5.0);
    }
}
