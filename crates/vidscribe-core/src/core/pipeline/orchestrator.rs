//! Stage sequencing for one run.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::artifacts::ArtifactStore;
use super::result::{PipelineResult, RunMetadata};
use super::PipelineOptions;
use crate::core::ai::InferenceClient;
use crate::core::analysis::{FrameAnalysis, FrameAnalyzer, PromptTemplates, VideoDescription};
use crate::core::events::{EventSink, PipelineEvent};
use crate::core::fs::{atomic_write_json_pretty, validate_video_input};
use crate::core::media::{FrameExtractor, Transcriber};
use crate::core::{CancelFlag, CoreResult, Frame, RunId, Stage, Transcript};

/// In-memory state carried from one stage to the next
#[derive(Default)]
struct RunState {
    frames: Vec<Frame>,
    transcript: Option<Transcript>,
    analyses: Vec<FrameAnalysis>,
    description: Option<VideoDescription>,
}

/// Runs capture, frame analysis and reconstruction in order.
///
/// Stages below the start stage are skipped and their outputs rehydrated
/// from the working directory. The result document is written only when
/// every stage succeeds; the working directory is removed afterwards unless
/// artifacts are kept, whether the run succeeded or not.
pub struct PipelineOrchestrator {
    client: Arc<InferenceClient>,
    templates: PromptTemplates,
    extractor: Arc<dyn FrameExtractor>,
    transcriber: Arc<dyn Transcriber>,
    events: Arc<dyn EventSink>,
    cancel: CancelFlag,
}

impl PipelineOrchestrator {
    pub fn new(
        client: Arc<InferenceClient>,
        extractor: Arc<dyn FrameExtractor>,
        transcriber: Arc<dyn Transcriber>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            templates: PromptTemplates::default(),
            extractor,
            transcriber,
            events,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling the run from another task
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(&self, options: &PipelineOptions) -> CoreResult<PipelineResult> {
        let run_id: RunId = ulid::Ulid::new().to_string();
        info!(
            run_id = %run_id,
            video = %options.video_path.display(),
            start_stage = %options.start_stage,
            "Starting run"
        );

        let outcome = match ArtifactStore::open(&options.work_dir) {
            Ok(store) => {
                let outcome = self.execute(&run_id, options, &store).await;
                self.finish_artifacts(&run_id, store, options.keep_artifacts);
                outcome
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => self.events.emit(PipelineEvent::RunCompleted {
                run_id: run_id.clone(),
                output_path: options.output_path.display().to_string(),
                total_cost: result.token_usage.total_cost,
            }),
            Err(e) => self.events.emit(PipelineEvent::RunFailed {
                run_id: run_id.clone(),
                stage: e.stage(),
                error_class: e.class_name().to_string(),
                message: e.to_string(),
            }),
        }
        outcome
    }

    async fn execute(
        &self,
        run_id: &RunId,
        options: &PipelineOptions,
        store: &ArtifactStore,
    ) -> CoreResult<PipelineResult> {
        let started_at = Utc::now();
        let analyzer = FrameAnalyzer::new(
            self.client.clone(),
            self.templates.clone(),
            options.generation.clone(),
            self.events.clone(),
        )
        .with_user_prompt(&options.user_prompt);

        let mut state = RunState::default();
        if options.start_stage > Stage::Capture {
            rehydrate(store, options.start_stage, &mut state)
                .map_err(|e| e.in_stage(options.start_stage))?;
        }

        for stage in Stage::ALL {
            if stage < options.start_stage {
                self.events.emit(PipelineEvent::StageSkipped {
                    run_id: run_id.clone(),
                    stage,
                });
                continue;
            }

            self.cancel.check().map_err(|e| e.in_stage(stage))?;
            self.events.emit(PipelineEvent::StageStarted {
                run_id: run_id.clone(),
                stage,
            });

            let outcome = match stage {
                Stage::Capture => self.capture(options, store, &mut state).await,
                Stage::FrameAnalysis => analyzer
                    .analyze(&state.frames, store, &self.cancel)
                    .await
                    .map(|analyses| state.analyses = analyses),
                Stage::Reconstruction => analyzer
                    .reconstruct(&state.analyses, &state.frames, state.transcript.as_ref())
                    .await
                    .map(|description| state.description = Some(description)),
            };
            outcome.map_err(|e| e.in_stage(stage))?;

            self.events.emit(PipelineEvent::StageCompleted {
                run_id: run_id.clone(),
                stage,
            });
        }

        let result = self.assemble(run_id, options, state, started_at);
        atomic_write_json_pretty(&options.output_path, &result)?;
        info!(output = %options.output_path.display(), "Result written");
        Ok(result)
    }

    async fn capture(
        &self,
        options: &PipelineOptions,
        store: &ArtifactStore,
        state: &mut RunState,
    ) -> CoreResult<()> {
        let video = validate_video_input(&options.video_path)?;
        store.reset_capture()?;

        state.transcript = if self.transcriber.is_enabled() {
            match self
                .extractor
                .extract_audio(&video, &store.audio_path(), options.sampling.duration)
                .await?
            {
                Some(audio) => self.transcriber.transcribe(&audio).await?,
                None => None,
            }
        } else {
            info!("Transcription disabled");
            None
        };
        if state.transcript.is_none() {
            warn!("No reliable transcript; continuing with frames only");
        }

        state.frames = self
            .extractor
            .extract_frames(&video, &store.frames_dir(), &options.sampling)
            .await?;
        store.save_frames(&state.frames)?;
        store.save_transcript(state.transcript.as_ref())?;
        Ok(())
    }

    fn assemble(
        &self,
        run_id: &RunId,
        options: &PipelineOptions,
        state: RunState,
        started_at: chrono::DateTime<Utc>,
    ) -> PipelineResult {
        let model = if options.generation.model.trim().is_empty() {
            self.client.default_model().to_string()
        } else {
            options.generation.model.clone()
        };
        let token_usage =
            PipelineResult::aggregate_usage(&state.analyses, state.description.as_ref());

        PipelineResult {
            metadata: RunMetadata {
                run_id: run_id.clone(),
                provider: self.client.provider_name().to_string(),
                model,
                whisper_model: options.whisper_model.clone(),
                frames_per_minute: options.sampling.frames_per_minute,
                duration_processed: options.sampling.duration,
                frames_extracted: state.frames.len(),
                frames_processed: state.analyses.len(),
                start_stage: options.start_stage,
                audio_language: state.transcript.as_ref().and_then(|t| t.language.clone()),
                transcription_successful: state.transcript.is_some(),
                started_at,
                finished_at: Utc::now(),
            },
            transcript: state.transcript,
            frame_analyses: state.analyses,
            token_usage,
            video_description: state.description,
        }
    }

    fn finish_artifacts(&self, run_id: &RunId, store: ArtifactStore, keep: bool) {
        if keep {
            info!(work_dir = %store.root().display(), "Keeping intermediate artifacts");
            store.release();
            return;
        }
        match store.cleanup() {
            Ok(()) => self.events.emit(PipelineEvent::ArtifactsCleaned {
                run_id: run_id.clone(),
            }),
            Err(e) => warn!("Failed to remove working directory: {}", e),
        }
    }
}

/// Loads the outputs of the stages below `start` from the working directory.
fn rehydrate(store: &ArtifactStore, start: Stage, state: &mut RunState) -> CoreResult<()> {
    state.frames = store.load_frames()?;
    state.transcript = store.load_transcript()?;
    if start > Stage::FrameAnalysis {
        state.analyses = store.load_analyses(&state.frames)?;
    }
    info!(
        frames = state.frames.len(),
        analyses = state.analyses.len(),
        transcript = state.transcript.is_some(),
        "Rehydrated earlier stages"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::core::ai::testing::{failure, reply, ScriptedProvider};
    use crate::core::ai::{FailureClass, TokenUsage};
    use crate::core::events::RecordingEventSink;
    use crate::core::media::{DisabledTranscriber, SamplingPlan};
    use crate::core::{CoreError, TimeSec};

    struct FakeExtractor {
        frames: usize,
        calls: AtomicUsize,
    }

    impl FakeExtractor {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FrameExtractor for FakeExtractor {
        async fn extract_frames(
            &self,
            _video: &Path,
            frames_dir: &Path,
            plan: &SamplingPlan,
        ) -> CoreResult<Vec<Frame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(frames_dir)?;
            let mut frames = Vec::new();
            for i in 0..self.frames {
                let path = frames_dir.join(format!("frame_{:04}.jpg", i));
                std::fs::write(&path, [0xFF, 0xD8, 0xFF, i as u8])?;
                frames.push(Frame::new(i, path, plan.timestamp_of(i)));
            }
            Ok(frames)
        }

        async fn extract_audio(
            &self,
            _video: &Path,
            output: &Path,
            _duration: Option<TimeSec>,
        ) -> CoreResult<Option<PathBuf>> {
            std::fs::write(output, b"RIFF")?;
            Ok(Some(output.to_path_buf()))
        }
    }

    struct FixedTranscriber;

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &Path) -> CoreResult<Option<Transcript>> {
            Ok(Some(Transcript {
                text: "Welcome to the kitchen.".to_string(),
                segments: Vec::new(),
                language: Some("en".to_string()),
            }))
        }
    }

    struct Harness {
        dir: TempDir,
        provider: Arc<ScriptedProvider>,
        extractor: Arc<FakeExtractor>,
        events: Arc<RecordingEventSink>,
        orchestrator: PipelineOrchestrator,
    }

    fn harness(
        outcomes: Vec<crate::core::ai::testing::Outcome>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video").unwrap();
        let provider = Arc::new(ScriptedProvider::new(outcomes));
        let events = Arc::new(RecordingEventSink::new());
        let client = InferenceClient::new(Box::new(provider.clone()), "gpt-4o", events.clone());
        let extractor = Arc::new(FakeExtractor::new(3));
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(client),
            extractor.clone(),
            transcriber,
            events.clone(),
        );
        Harness {
            dir,
            provider,
            extractor,
            events,
            orchestrator,
        }
    }

    impl Harness {
        fn options(&self) -> PipelineOptions {
            PipelineOptions::new(self.dir.path().join("clip.mp4"), &self.dir.path().join("out"))
        }
    }

    fn stored_analysis(frame: &Frame, text: &str) -> FrameAnalysis {
        FrameAnalysis {
            frame: frame.clone(),
            response_text: text.to_string(),
            usage: TokenUsage::default(),
        }
    }

    #[tokio::test]
    async fn full_run_aggregates_usage_and_cleans_up() {
        let h = harness(
            vec![
                reply("a kitchen", 10, 5),
                reply("a cook enters", 20, 8),
                reply("eggs in a pan", 15, 6),
                reply("Someone cooks eggs.", 30, 10),
            ],
            Arc::new(FixedTranscriber),
        );
        let options = h.options();

        let result = h.orchestrator.run(&options).await.unwrap();

        assert_eq!(result.frame_analyses.len(), 3);
        assert_eq!(result.token_usage.prompt_tokens, 75);
        assert_eq!(result.token_usage.completion_tokens, 29);
        assert_eq!(result.token_usage.calls, 4);
        assert_eq!(
            result.video_description.as_ref().unwrap().response,
            "Someone cooks eggs."
        );
        assert_eq!(result.metadata.frames_extracted, 3);
        assert_eq!(result.metadata.audio_language.as_deref(), Some("en"));
        assert!(result.metadata.transcription_successful);
        assert_eq!(result.metadata.model, "gpt-4o");

        let last_prompt = &h.provider.requests()[3].prompt;
        assert!(last_prompt.contains("Welcome to the kitchen."));

        let written: PipelineResult =
            crate::core::fs::read_json(&options.output_path).unwrap();
        assert_eq!(written, result);
        assert!(!options.work_dir.exists());
        assert!(matches!(
            h.events.events().last(),
            Some(PipelineEvent::RunCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn resume_at_reconstruction_keeps_analyses_verbatim() {
        let h = harness(
            vec![reply("A fresh description.", 30, 10)],
            Arc::new(DisabledTranscriber),
        );
        let options = h.options().with_start_stage(Stage::Reconstruction);

        let store = ArtifactStore::open(&options.work_dir).unwrap();
        let frames: Vec<_> = (0..2)
            .map(|i| Frame::new(i, store.frames_dir().join(format!("frame_{:04}.jpg", i)), i as f64))
            .collect();
        let previous: Vec<_> = frames
            .iter()
            .map(|f| stored_analysis(f, &format!("earlier note {}", f.index)))
            .collect();
        store.save_frames(&frames).unwrap();
        for analysis in &previous {
            store.save_analysis(analysis).unwrap();
        }
        store.release();

        let result = h.orchestrator.run(&options).await.unwrap();

        assert_eq!(result.frame_analyses, previous);
        assert_eq!(
            result.video_description.unwrap().response,
            "A fresh description."
        );
        assert_eq!(result.metadata.start_stage, Stage::Reconstruction);
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.provider.requests().len(), 1);
        assert!(h.provider.requests()[0].prompt.contains("earlier note 1"));

        let skipped: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StageSkipped { stage, .. } => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec![Stage::Capture, Stage::FrameAnalysis]);
    }

    #[tokio::test]
    async fn frame_failure_fails_run_without_result() {
        let h = harness(
            vec![
                reply("a kitchen", 10, 5),
                failure(FailureClass::ClientError),
                reply("never sent", 1, 1),
            ],
            Arc::new(DisabledTranscriber),
        );
        let options = h.options();

        let err = h.orchestrator.run(&options).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::FrameAnalysis));
        assert_eq!(err.class_name(), "permanent_error");
        assert_eq!(h.provider.requests().len(), 2);
        assert!(!options.output_path.exists());
        assert!(!options.work_dir.exists());
        assert!(matches!(
            h.events.events().last(),
            Some(PipelineEvent::RunFailed {
                stage: Some(Stage::FrameAnalysis),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn kept_artifacts_survive_failure() {
        let h = harness(
            vec![reply("a kitchen", 10, 5), failure(FailureClass::MissingField)],
            Arc::new(DisabledTranscriber),
        );
        let mut options = h.options();
        options.keep_artifacts = true;

        assert!(h.orchestrator.run(&options).await.is_err());

        assert!(options.work_dir.join("analyses/frame_0000.json").is_file());
        assert!(!options.work_dir.join("analyses/frame_0001.json").exists());
        assert!(options.work_dir.join("frames.json").is_file());
    }

    #[tokio::test]
    async fn fresh_capture_discards_earlier_run_artifacts() {
        let h = harness(
            vec![
                reply("a kitchen", 10, 5),
                reply("a cook enters", 20, 8),
                reply("eggs in a pan", 15, 6),
                reply("Someone cooks eggs.", 30, 10),
            ],
            Arc::new(DisabledTranscriber),
        );
        let mut options = h.options();
        options.keep_artifacts = true;

        let store = ArtifactStore::open(&options.work_dir).unwrap();
        std::fs::create_dir_all(store.frames_dir()).unwrap();
        for i in 0..5 {
            let frame = Frame::new(i, store.frames_dir().join(format!("frame_{:04}.jpg", i)), i as f64);
            std::fs::write(&frame.path, b"old").unwrap();
            store.save_analysis(&stored_analysis(&frame, "earlier run")).unwrap();
        }
        store.release();

        let result = h.orchestrator.run(&options).await.unwrap();

        assert_eq!(result.metadata.frames_extracted, 3);
        assert!(result
            .frame_analyses
            .iter()
            .all(|a| a.response_text != "earlier run"));
        let analyses_dir = options.work_dir.join("analyses");
        assert_eq!(std::fs::read_dir(&analyses_dir).unwrap().count(), 3);
        assert!(!analyses_dir.join("frame_0004.json").exists());
        assert!(!options.work_dir.join("frames/frame_0003.jpg").exists());
    }

    #[tokio::test]
    async fn resume_without_state_is_reported() {
        let h = harness(vec![], Arc::new(DisabledTranscriber));
        let options = h.options().with_start_stage(Stage::FrameAnalysis);

        let err = h.orchestrator.run(&options).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::FrameAnalysis));
        assert!(matches!(
            err,
            CoreError::Stage { ref source, .. } if matches!(**source, CoreError::ResumeStateMissing(_))
        ));
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_starts_nothing() {
        let h = harness(vec![], Arc::new(DisabledTranscriber));
        h.orchestrator.cancel_flag().cancel();

        let err = h.orchestrator.run(&h.options()).await.unwrap_err();

        assert_eq!(err.class_name(), "cancelled");
        assert_eq!(err.stage(), Some(Stage::Capture));
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    }
}
