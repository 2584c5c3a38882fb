//! Run Event Module
//!
//! Per-run structured event sink. Each pipeline run is handed its own sink, so
//! concurrent runs never interleave state through a global logger.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{RunId, Stage};

// =============================================================================
// Event Types
// =============================================================================

/// Event names used by log-streaming front-ends
pub mod event_names {
    pub const STAGE_STARTED: &str = "stage:started";
    pub const STAGE_SKIPPED: &str = "stage:skipped";
    pub const STAGE_COMPLETED: &str = "stage:completed";
    pub const FRAME_ANALYZED: &str = "frame:analyzed";
    pub const ATTEMPT_FAILED: &str = "inference:attempt_failed";
    pub const RETRIES_EXHAUSTED: &str = "inference:retries_exhausted";
    pub const ARTIFACTS_CLEANED: &str = "run:artifacts_cleaned";
    pub const RUN_COMPLETED: &str = "run:completed";
    pub const RUN_FAILED: &str = "run:failed";
}

/// Something observable that happened during a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    StageStarted { run_id: RunId, stage: Stage },
    #[serde(rename_all = "camelCase")]
    StageSkipped { run_id: RunId, stage: Stage },
    #[serde(rename_all = "camelCase")]
    StageCompleted { run_id: RunId, stage: Stage },
    #[serde(rename_all = "camelCase")]
    FrameAnalyzed {
        frame_number: usize,
        total_frames: usize,
        total_tokens: u64,
    },
    /// One failed inference attempt; `message` is already redacted
    #[serde(rename_all = "camelCase")]
    AttemptFailed {
        provider: String,
        attempt: u32,
        max_attempts: u32,
        error_class: String,
        wait_secs: f64,
        will_retry: bool,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        error_class: String,
    },
    #[serde(rename_all = "camelCase")]
    ArtifactsCleaned { run_id: RunId },
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        run_id: RunId,
        output_path: String,
        total_cost: f64,
    },
    #[serde(rename_all = "camelCase")]
    RunFailed {
        run_id: RunId,
        stage: Option<Stage>,
        error_class: String,
        message: String,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::StageStarted { .. } => event_names::STAGE_STARTED,
            PipelineEvent::StageSkipped { .. } => event_names::STAGE_SKIPPED,
            PipelineEvent::StageCompleted { .. } => event_names::STAGE_COMPLETED,
            PipelineEvent::FrameAnalyzed { .. } => event_names::FRAME_ANALYZED,
            PipelineEvent::AttemptFailed { .. } => event_names::ATTEMPT_FAILED,
            PipelineEvent::RetriesExhausted { .. } => event_names::RETRIES_EXHAUSTED,
            PipelineEvent::ArtifactsCleaned { .. } => event_names::ARTIFACTS_CLEANED,
            PipelineEvent::RunCompleted { .. } => event_names::RUN_COMPLETED,
            PipelineEvent::RunFailed { .. } => event_names::RUN_FAILED,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives run events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Writes events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent) {
        let name = event.name();
        match &event {
            PipelineEvent::StageStarted { run_id, stage } => {
                info!(event = name, run_id = %run_id, stage = %stage, "Stage started");
            }
            PipelineEvent::StageSkipped { run_id, stage } => {
                info!(event = name, run_id = %run_id, stage = %stage, "Stage skipped (resuming)");
            }
            PipelineEvent::StageCompleted { run_id, stage } => {
                info!(event = name, run_id = %run_id, stage = %stage, "Stage completed");
            }
            PipelineEvent::FrameAnalyzed {
                frame_number,
                total_frames,
                total_tokens,
            } => {
                info!(
                    event = name,
                    frame = frame_number,
                    total = total_frames,
                    tokens = total_tokens,
                    "Frame analyzed"
                );
            }
            PipelineEvent::AttemptFailed {
                provider,
                attempt,
                max_attempts,
                error_class,
                wait_secs,
                will_retry,
                message,
            } => {
                warn!(
                    event = name,
                    provider = %provider,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error_class = %error_class,
                    wait_secs = wait_secs,
                    will_retry = will_retry,
                    "Inference attempt failed: {}",
                    message
                );
            }
            PipelineEvent::RetriesExhausted {
                provider,
                attempts,
                error_class,
            } => {
                error!(
                    event = name,
                    provider = %provider,
                    attempts = attempts,
                    error_class = %error_class,
                    "Retries exhausted"
                );
            }
            PipelineEvent::ArtifactsCleaned { run_id } => {
                debug!(event = name, run_id = %run_id, "Intermediate artifacts removed");
            }
            PipelineEvent::RunCompleted {
                run_id,
                output_path,
                total_cost,
            } => {
                info!(
                    event = name,
                    run_id = %run_id,
                    output = %output_path,
                    total_cost = total_cost,
                    "Analysis complete"
                );
            }
            PipelineEvent::RunFailed {
                run_id,
                stage,
                error_class,
                message,
            } => {
                error!(
                    event = name,
                    run_id = %run_id,
                    stage = ?stage,
                    error_class = %error_class,
                    "Run failed: {}",
                    message
                );
            }
        }
    }
}

/// Forwards events to a channel, e.g. for streaming logs to a browser.
/// Logs through `tracing` as well.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: PipelineEvent) {
        TracingEventSink.emit(event.clone());
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
