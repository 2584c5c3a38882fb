//! Whisper-compatible transcription through an external command.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use super::Transcriber;
use crate::core::settings::AudioSettings;
use crate::core::{CoreError, CoreResult, Transcript};

/// Runs `{command} <audio> --model M --device D [--language L]
/// --output_format json --output_dir DIR` and reads `DIR/<stem>.json`.
#[derive(Clone, Debug)]
pub struct CommandTranscriber {
    command: PathBuf,
    model: String,
    device: String,
    language: Option<String>,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<PathBuf>, model: &str) -> Self {
        Self {
            command: command.into(),
            model: model.to_string(),
            device: "cpu".to_string(),
            language: None,
        }
    }

    pub fn from_settings(audio: &AudioSettings) -> Self {
        let mut transcriber = Self::new(&audio.command, &audio.whisper_model);
        transcriber.device = audio.device.clone();
        transcriber.language = audio.language.clone().filter(|l| !l.trim().is_empty());
        transcriber
    }

    fn args(&self, audio: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--device".to_string(),
            self.device.clone(),
        ];
        if let Some(language) = &self.language {
            args.extend(["--language".to_string(), language.clone()]);
        }
        args.extend([
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &Path) -> CoreResult<Option<Transcript>> {
        let output_dir = audio
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!(model = %self.model, audio = %audio.display(), "Transcribing audio");

        let output = tokio::process::Command::new(&self.command)
            .args(self.args(audio, &output_dir))
            .output()
            .await
            .map_err(|e| {
                CoreError::Capture(format!("Failed to run {}: {}", self.command.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Capture(format!(
                "Transcription failed: {}",
                stderr.trim()
            )));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let json = tokio::fs::read_to_string(output_dir.join(format!("{}.json", stem))).await?;
        parse_transcript(&json, self.language.as_deref())
    }
}

/// Never transcribes
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(&self, _audio: &Path) -> CoreResult<Option<Transcript>> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Blank transcripts are unreliable and come back as `None`.
pub fn parse_transcript(json: &str, fallback_language: Option<&str>) -> CoreResult<Option<Transcript>> {
    let mut transcript: Transcript = serde_json::from_str(json)
        .map_err(|e| CoreError::Capture(format!("Unreadable transcript: {}", e)))?;

    if !transcript.is_reliable() {
        warn!("Transcript is empty; continuing without audio context");
        return Ok(None);
    }

    transcript.text = transcript.text.trim().to_string();
    for segment in &mut transcript.segments {
        segment.text = segment.text.trim().to_string();
    }
    if transcript.language.is_none() {
        transcript.language = fallback_language.map(str::to_string);
    }
    Ok(Some(transcript))
}
