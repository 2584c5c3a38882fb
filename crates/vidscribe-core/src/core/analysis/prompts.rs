//! Prompt templates for frame analysis and video reconstruction.
//!
//! Templates are plain text with `{PLACEHOLDER}` tokens. Built-in defaults are
//! used unless a prompt directory supplies `frame_analysis.txt` or
//! `describe.txt`.

use std::path::Path;

use tracing::debug;

use crate::core::{CoreError, CoreResult, Frame};

/// Override file for the per-frame prompt
pub const FRAME_ANALYSIS_FILE: &str = "frame_analysis.txt";

/// Override file for the reconstruction prompt
pub const RECONSTRUCTION_FILE: &str = "describe.txt";

const DEFAULT_FRAME_ANALYSIS: &str = r#"You are a visual analyst taking notes on a video, one frame at a time.

Notes on previous frames:
{PREVIOUS_FRAMES}

This is frame {FRAME_NUMBER}, captured at {TIMESTAMP}.
Describe what is visible: setting, people and objects, actions and movement,
on-screen text, and anything that changed since the previous frame.
Keep the notes factual and concise.
{USER_PROMPT}"#;

const DEFAULT_RECONSTRUCTION: &str = r#"You are given chronological notes taken on frames sampled from one video,
and a transcript of its audio when one is available.

Frame notes:
{FRAME_NOTES}

First frame:
{FIRST_FRAME}

Audio transcript:
{TRANSCRIPT}

Write one coherent description of the whole video: what happens, in what
order, who is involved and where. Do not describe frames one by one.
{USER_PROMPT}"#;

const NO_PREVIOUS_FRAMES: &str = "This is the first frame.";
const NO_TRANSCRIPT: &str = "No reliable transcript available.";

#[derive(Clone, Debug, PartialEq)]
pub struct PromptTemplates {
    pub frame_analysis: String,
    pub video_reconstruction: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            frame_analysis: DEFAULT_FRAME_ANALYSIS.to_string(),
            video_reconstruction: DEFAULT_RECONSTRUCTION.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Loads overrides from `dir`; files that are absent keep the default.
    pub fn load(dir: Option<&Path>) -> CoreResult<Self> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };
        if !dir.is_dir() {
            return Err(CoreError::Config(format!(
                "prompt directory not found: {}",
                dir.display()
            )));
        }

        if let Some(text) = read_override(&dir.join(FRAME_ANALYSIS_FILE))? {
            templates.frame_analysis = text;
        }
        if let Some(text) = read_override(&dir.join(RECONSTRUCTION_FILE))? {
            templates.video_reconstruction = text;
        }
        Ok(templates)
    }

    /// Per-frame prompt. `previous_notes` is the rendered notes of the frames
    /// analyzed so far.
    pub fn render_frame(&self, frame: &Frame, previous_notes: &str, user_prompt: &str) -> String {
        let previous = if previous_notes.trim().is_empty() {
            NO_PREVIOUS_FRAMES
        } else {
            previous_notes
        };
        self.frame_analysis
            .replace("{PREVIOUS_FRAMES}", previous)
            .replace("{FRAME_NUMBER}", &frame.number().to_string())
            .replace("{TIMESTAMP}", &format_timestamp(frame.timestamp))
            .replace("{USER_PROMPT}", &user_question(user_prompt))
    }

    pub fn render_reconstruction(
        &self,
        frame_notes: &str,
        first_frame: &str,
        transcript: Option<&str>,
        user_prompt: &str,
    ) -> String {
        let transcript = transcript
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(NO_TRANSCRIPT);
        self.video_reconstruction
            .replace("{FRAME_NOTES}", frame_notes)
            .replace("{FIRST_FRAME}", first_frame)
            .replace("{TRANSCRIPT}", transcript)
            .replace("{USER_PROMPT}", &user_question(user_prompt))
    }
}

fn read_override(path: &Path) -> CoreResult<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    debug!("Using prompt override {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Ok(Some(text))
}

fn user_question(user_prompt: &str) -> String {
    let trimmed = user_prompt.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("Also answer this question about the video: {}", trimmed)
    }
}

/// `mm:ss.s` video position
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{:02}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}
