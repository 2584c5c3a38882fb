//! Sequential frame analysis and video reconstruction.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::prompts::{format_timestamp, PromptTemplates};
use super::{FrameAnalysis, FrameArtifactSink, GenerationOptions, VideoDescription};
use crate::core::ai::{ImagePayload, InferenceClient};
use crate::core::events::{EventSink, PipelineEvent};
use crate::core::{CancelFlag, CoreResult, Frame, Transcript};

/// Analyzes frames one at a time, in ordinal order, with the notes of the
/// earlier frames as context.
pub struct FrameAnalyzer {
    client: Arc<InferenceClient>,
    templates: PromptTemplates,
    options: GenerationOptions,
    user_prompt: String,
    events: Arc<dyn EventSink>,
}

impl FrameAnalyzer {
    pub fn new(
        client: Arc<InferenceClient>,
        templates: PromptTemplates,
        options: GenerationOptions,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            templates,
            options,
            user_prompt: String::new(),
            events,
        }
    }

    pub fn with_user_prompt(mut self, prompt: &str) -> Self {
        self.user_prompt = prompt.to_string();
        self
    }

    /// Analyzes every frame. The first failing frame aborts the whole call;
    /// later frames are never sent.
    pub async fn analyze(
        &self,
        frames: &[Frame],
        artifacts: &dyn FrameArtifactSink,
        cancel: &CancelFlag,
    ) -> CoreResult<Vec<FrameAnalysis>> {
        let mut ordered: Vec<&Frame> = frames.iter().collect();
        ordered.sort_by_key(|frame| frame.index);

        let total = ordered.len();
        let mut analyses: Vec<FrameAnalysis> = Vec::with_capacity(total);
        let mut total_tokens = 0u64;

        for frame in ordered {
            cancel.check()?;

            let analysis = self.analyze_frame(frame, &analyses).await?;
            artifacts.record(&analysis)?;

            total_tokens += analysis.usage.total_tokens;
            self.events.emit(PipelineEvent::FrameAnalyzed {
                frame_number: frame.number(),
                total_frames: total,
                total_tokens,
            });
            analyses.push(analysis);
        }

        Ok(analyses)
    }

    /// Sends one frame with the notes of `previous` as context.
    pub async fn analyze_frame(
        &self,
        frame: &Frame,
        previous: &[FrameAnalysis],
    ) -> CoreResult<FrameAnalysis> {
        let image = ImagePayload::from_path(&frame.path).await?;
        let prompt = self
            .templates
            .render_frame(frame, &render_notes(previous), &self.user_prompt);

        debug!(frame = frame.number(), path = %frame.path.display(), "Analyzing frame");
        let result = self
            .client
            .generate(self.options.request(&prompt).with_image(image))
            .await?;

        Ok(FrameAnalysis {
            frame: frame.clone(),
            response_text: result.response_text,
            usage: result.usage,
        })
    }

    /// Combines the frame notes and transcript into one text-only call.
    pub async fn reconstruct(
        &self,
        analyses: &[FrameAnalysis],
        frames: &[Frame],
        transcript: Option<&Transcript>,
    ) -> CoreResult<VideoDescription> {
        if analyses.is_empty() {
            warn!("Reconstructing without any frame notes");
        }
        if analyses.len() < frames.len() {
            warn!(
                analyzed = analyses.len(),
                captured = frames.len(),
                "Some captured frames have no notes"
            );
        }

        let notes = render_notes(analyses);
        let first_frame = analyses
            .first()
            .map(|a| a.response_text.as_str())
            .unwrap_or_default();
        let transcript_text = transcript
            .filter(|t| t.is_reliable())
            .map(|t| t.text.as_str());

        let prompt = self.templates.render_reconstruction(
            &notes,
            first_frame,
            transcript_text,
            &self.user_prompt,
        );

        info!(frames = analyses.len(), "Reconstructing video description");
        let result = self.client.generate(self.options.request(&prompt)).await?;

        Ok(VideoDescription {
            response: result.response_text,
            usage: result.usage,
        })
    }
}

/// Chronological notes, one line block per frame
fn render_notes(analyses: &[FrameAnalysis]) -> String {
    analyses
        .iter()
        .map(|a| {
            format!(
                "Frame {} ({}): {}",
                a.frame.number(),
                format_timestamp(a.frame.timestamp),
                a.response_text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
