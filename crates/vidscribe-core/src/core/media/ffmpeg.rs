//! FFmpeg-backed frame and audio capture.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::{FrameExtractor, SamplingPlan};
use crate::core::{CoreError, CoreResult, Frame, TimeSec};

/// Sample rate expected by whisper-compatible transcribers
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Runs `ffmpeg` / `ffprobe` from `PATH` unless explicit paths are given.
#[derive(Clone, Debug)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Whether the video carries at least one audio stream
    pub async fn has_audio(&self, video: &Path) -> CoreResult<bool> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "json",
            ])
            .arg(video)
            .output()
            .await
            .map_err(|e| spawn_error(&self.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(exit_error("ffprobe", &output.stderr));
        }
        parse_audio_probe(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frames(
        &self,
        video: &Path,
        frames_dir: &Path,
        plan: &SamplingPlan,
    ) -> CoreResult<Vec<Frame>> {
        tokio::fs::create_dir_all(frames_dir).await?;
        let removed = clear_stale_frames(frames_dir)?;
        if removed > 0 {
            debug!(removed, "Removed frames left by an earlier capture");
        }
        info!(
            video = %video.display(),
            per_minute = plan.frames_per_minute,
            "Extracting frames"
        );

        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(frame_args(video, frames_dir, plan))
            .output()
            .await
            .map_err(|e| spawn_error(&self.ffmpeg_path, e))?;

        if !output.status.success() {
            return Err(exit_error("Frame extraction", &output.stderr));
        }

        let frames = collect_frames(frames_dir, plan)?;
        if frames.is_empty() {
            return Err(CoreError::Capture(format!(
                "no frames were extracted from {}",
                video.display()
            )));
        }
        debug!(count = frames.len(), "Frames extracted");
        Ok(frames)
    }

    async fn extract_audio(
        &self,
        video: &Path,
        output: &Path,
        duration: Option<TimeSec>,
    ) -> CoreResult<Option<PathBuf>> {
        if !self.has_audio(video).await? {
            info!("No audio stream found");
            return Ok(None);
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = tokio::process::Command::new(&self.ffmpeg_path)
            .args(audio_args(video, output, duration))
            .output()
            .await
            .map_err(|e| spawn_error(&self.ffmpeg_path, e))?;

        if !result.status.success() {
            return Err(exit_error("Audio extraction", &result.stderr));
        }
        Ok(Some(output.to_path_buf()))
    }
}

/// `-t` before `-i` limits the input; frames are numbered from zero.
fn frame_args(video: &Path, frames_dir: &Path, plan: &SamplingPlan) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "error".to_string()];
    if let Some(duration) = plan.duration {
        args.extend(["-t".to_string(), format!("{:.3}", duration)]);
    }
    args.extend([
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("fps={}/60", plan.frames_per_minute),
        "-q:v".to_string(),
        "2".to_string(),
    ]);
    if let Some(max) = plan.max_frames {
        args.extend(["-frames:v".to_string(), max.to_string()]);
    }
    args.extend([
        "-start_number".to_string(),
        "0".to_string(),
        "-y".to_string(),
        frames_dir.join("frame_%04d.jpg").to_string_lossy().to_string(),
    ]);
    args
}

fn audio_args(video: &Path, output: &Path, duration: Option<TimeSec>) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        AUDIO_SAMPLE_RATE.to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
    ];
    if let Some(duration) = duration {
        args.extend(["-t".to_string(), format!("{:.3}", duration)]);
    }
    args.extend(["-y".to_string(), output.to_string_lossy().to_string()]);
    args
}

fn frame_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^frame_(\d+)\.jpg$").expect("valid frame pattern"))
}

/// Deletes `frame_NNNN.jpg` files so a shorter capture cannot pick up old ones.
fn clear_stale_frames(frames_dir: &Path) -> CoreResult<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(frames_dir)? {
        let path = entry?.path();
        let is_frame = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| frame_file_pattern().is_match(name));
        if is_frame && path.is_file() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Lists captured frame files in ordinal order.
fn collect_frames(frames_dir: &Path, plan: &SamplingPlan) -> CoreResult<Vec<Frame>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(frames_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(index) = frame_file_pattern()
            .captures(name)
            .and_then(|c| c[1].parse::<usize>().ok())
        else {
            continue;
        };
        frames.push(Frame::new(index, path, plan.timestamp_of(index)));
    }
    frames.sort_by_key(|frame| frame.index);
    if let Some(max) = plan.max_frames {
        frames.truncate(max);
    }
    Ok(frames)
}

fn parse_audio_probe(json: &str) -> CoreResult<bool> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CoreError::Capture(format!("Failed to parse ffprobe output: {}", e)))?;
    Ok(value
        .get("streams")
        .and_then(|s| s.as_array())
        .is_some_and(|streams| !streams.is_empty()))
}

fn spawn_error(program: &Path, err: std::io::Error) -> CoreError {
    CoreError::Capture(format!("Failed to run {}: {}", program.display(), err))
}

fn exit_error(what: &str, stderr: &[u8]) -> CoreError {
    let stderr = String::from_utf8_lossy(stderr);
    CoreError::Capture(format!("{} failed: {}", what, stderr.trim()))
}
