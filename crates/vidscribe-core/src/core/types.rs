//! vidscribe Core Type Definitions
//!
//! Defines the value types that flow between capture, analysis and reconstruction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CoreError, CoreResult};

// =============================================================================
// ID / Time Types
// =============================================================================

/// Pipeline run identifier (ULID)
pub type RunId = String;

/// Time in seconds (floating point)
pub type TimeSec = f64;

// =============================================================================
// Stages
// =============================================================================

/// Ordered pipeline stages. The numeric value doubles as the resume cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    /// Audio transcription and frame capture
    Capture = 1,
    /// Per-frame vision analysis
    FrameAnalysis = 2,
    /// Synthesis of the final description
    Reconstruction = 3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Capture, Stage::FrameAnalysis, Stage::Reconstruction];

    /// Short label used in logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::FrameAnalysis => "frame_analysis",
            Stage::Reconstruction => "reconstruction",
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Stage::Capture),
            2 => Ok(Stage::FrameAnalysis),
            3 => Ok(Stage::Reconstruction),
            other => Err(format!("Stage must be between 1 and 3, got {}", other)),
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage as u8
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", *self as u8, self.label())
    }
}

// =============================================================================
// Frames
// =============================================================================

/// A captured still image from the source video
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Zero-based ordinal position in the capture sequence
    pub index: usize,
    /// Image file on disk
    pub path: PathBuf,
    /// Position in the source video
    pub timestamp: TimeSec,
}

impl Frame {
    pub fn new(index: usize, path: impl Into<PathBuf>, timestamp: TimeSec) -> Self {
        Self {
            index,
            path: path.into(),
            timestamp,
        }
    }

    /// One-based frame number as shown to models and humans
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// File name without directories, used to name per-frame artifacts
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("frame_{:04}", self.index))
    }
}

// =============================================================================
// Transcript
// =============================================================================

/// A timed span of transcribed speech
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: TimeSec,
    pub end: TimeSec,
    pub text: String,
}

/// Speech transcript of the source video's audio track
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Full transcript text
    pub text: String,
    /// Ordered timed segments
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    /// Detected or configured language code
    #[serde(default)]
    pub language: Option<String>,
}

impl Transcript {
    /// A transcript with no spoken text is not useful context.
    pub fn is_reliable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation, checked before each stage and each frame.
/// An in-flight inference call is never aborted.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`CoreError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}
