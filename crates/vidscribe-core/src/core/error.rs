//! vidscribe Error Definitions
//!
//! Defines error types used throughout the engine.

use std::path::PathBuf;

use thiserror::Error;

use super::Stage;
use crate::core::ai::FailureClass;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Inference Errors
    // =========================================================================
    #[error("{provider} request failed ({class}, retryable): {message}")]
    Transient {
        provider: String,
        class: FailureClass,
        message: String,
    },

    #[error("{provider} request failed ({class}): {message}")]
    Permanent {
        provider: String,
        class: FailureClass,
        message: String,
    },

    #[error("{provider} request failed after {attempts} attempts ({class}): {message}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        class: FailureClass,
        message: String,
    },

    // =========================================================================
    // Media Errors
    // =========================================================================
    #[error("Failed to read frame {}: {source}", path.display())]
    FrameIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture failed: {0}")]
    Capture(String),

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Cannot resume: {0}")]
    ResumeStateMissing(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Stage {} ({}) failed: {source}", *stage as u8, stage.label())]
    Stage {
        stage: Stage,
        #[source]
        source: Box<CoreError>,
    },

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Attaches stage context. Errors that already carry a stage are left alone.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            CoreError::Stage { .. } => self,
            other => CoreError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage at which the error occurred, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CoreError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Stable error-class label surfaced to callers.
    pub fn class_name(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config_error",
            CoreError::Transient { .. } => "transient_error",
            CoreError::Permanent { .. } => "permanent_error",
            CoreError::RetriesExhausted { .. } => "retries_exhausted",
            CoreError::FrameIo { .. } => "frame_io_error",
            CoreError::Capture(_) => "capture_error",
            CoreError::ResumeStateMissing(_) => "resume_state_missing",
            CoreError::Cancelled => "cancelled",
            CoreError::Stage { source, .. } => source.class_name(),
            CoreError::Io(_) => "io_error",
            CoreError::Json(_) => "json_error",
            CoreError::Internal(_) => "internal_error",
        }
    }

    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient { .. })
    }
}
