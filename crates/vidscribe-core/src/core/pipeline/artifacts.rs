//! Working-directory layout of one run.
//!
//! ```text
//! {work_dir}/
//!   .lock                     exclusive advisory lock held for the run
//!   frames/frame_NNNN.jpg     captured frames
//!   frames.json               frame manifest
//!   transcript.json           transcript, absent when unreliable
//!   analyses/frame_NNNN.json  per-frame analyses
//!   audio.wav                 extracted audio track
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::analysis::{FrameAnalysis, FrameArtifactSink};
use crate::core::fs::{atomic_write_json_pretty, read_json};
use crate::core::{CoreError, CoreResult, Frame, Transcript};

const LOCK_FILE: &str = ".lock";
const FRAMES_DIR: &str = "frames";
const ANALYSES_DIR: &str = "analyses";
const FRAME_MANIFEST: &str = "frames.json";
const TRANSCRIPT_FILE: &str = "transcript.json";
const AUDIO_FILE: &str = "audio.wav";

/// Exclusive owner of a run's working directory
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    lock: File,
}

impl ArtifactStore {
    /// Creates the directory if needed and takes the lock. Fails when another
    /// run holds it.
    pub fn open(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        fs2::FileExt::try_lock_exclusive(&lock).map_err(|_| {
            CoreError::Config(format!(
                "working directory {} is in use by another run",
                root.display()
            ))
        })?;

        debug!("Locked working directory {}", root.display());
        Ok(Self { root, lock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn analyses_dir(&self) -> PathBuf {
        self.root.join(ANALYSES_DIR)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    fn analysis_path(&self, frame: &Frame) -> PathBuf {
        self.analyses_dir().join(format!("{}.json", frame.file_stem()))
    }

    // =========================================================================
    // Capture artifacts
    // =========================================================================

    /// Drops frames, the manifest and per-frame analyses of an earlier run
    /// before a fresh capture.
    pub fn reset_capture(&self) -> CoreResult<()> {
        for dir in [self.frames_dir(), self.analyses_dir()] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        let manifest = self.root.join(FRAME_MANIFEST);
        if manifest.exists() {
            std::fs::remove_file(&manifest)?;
        }
        debug!("Cleared capture artifacts in {}", self.root.display());
        Ok(())
    }

    pub fn save_frames(&self, frames: &[Frame]) -> CoreResult<()> {
        atomic_write_json_pretty(&self.root.join(FRAME_MANIFEST), &frames)
    }

    /// Frame manifest in ordinal order
    pub fn load_frames(&self) -> CoreResult<Vec<Frame>> {
        let path = self.root.join(FRAME_MANIFEST);
        if !path.is_file() {
            return Err(CoreError::ResumeStateMissing(format!(
                "frame manifest not found at {}",
                path.display()
            )));
        }
        let mut frames: Vec<Frame> = read_json(&path)?;
        frames.sort_by_key(|frame| frame.index);
        Ok(frames)
    }

    /// `None` removes a transcript left over from an earlier run.
    pub fn save_transcript(&self, transcript: Option<&Transcript>) -> CoreResult<()> {
        let path = self.root.join(TRANSCRIPT_FILE);
        match transcript {
            Some(transcript) => atomic_write_json_pretty(&path, transcript),
            None => {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            }
        }
    }

    pub fn load_transcript(&self) -> CoreResult<Option<Transcript>> {
        let path = self.root.join(TRANSCRIPT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let transcript: Transcript = read_json(&path)?;
        Ok(Some(transcript).filter(Transcript::is_reliable))
    }

    // =========================================================================
    // Analysis artifacts
    // =========================================================================

    pub fn save_analysis(&self, analysis: &FrameAnalysis) -> CoreResult<()> {
        atomic_write_json_pretty(&self.analysis_path(&analysis.frame), analysis)
    }

    /// Loads one analysis per manifest frame, in manifest order.
    pub fn load_analyses(&self, frames: &[Frame]) -> CoreResult<Vec<FrameAnalysis>> {
        frames
            .iter()
            .map(|frame| {
                let path = self.analysis_path(frame);
                if !path.is_file() {
                    return Err(CoreError::ResumeStateMissing(format!(
                        "analysis for frame {} not found at {}",
                        frame.number(),
                        path.display()
                    )));
                }
                read_json(&path)
            })
            .collect()
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Releases the lock and deletes the working directory.
    pub fn cleanup(self) -> CoreResult<()> {
        let root = self.root.clone();
        self.release();
        std::fs::remove_dir_all(&root)?;
        debug!("Removed working directory {}", root.display());
        Ok(())
    }

    /// Releases the lock and keeps every artifact.
    pub fn release(self) {
        if let Err(e) = fs2::FileExt::unlock(&self.lock) {
            warn!("Failed to unlock working directory: {}", e);
        }
    }
}

impl FrameArtifactSink for ArtifactStore {
    fn record(&self, analysis: &FrameAnalysis) -> CoreResult<()> {
        self.save_analysis(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::TokenUsage;
    use tempfile::TempDir;

    fn analysis(frame: &Frame, text: &str) -> FrameAnalysis {
        FrameAnalysis {
            frame: frame.clone(),
            response_text: text.to_string(),
            usage: TokenUsage::default(),
        }
    }

    #[test]
    fn second_run_cannot_share_working_directory() {
        let dir = TempDir::new().unwrap();
        let first = ArtifactStore::open(dir.path().join("work")).unwrap();

        let err = ArtifactStore::open(dir.path().join("work")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));

        first.release();
        assert!(ArtifactStore::open(dir.path().join("work")).is_ok());
    }

    #[test]
    fn manifest_and_analyses_round_trip_in_order() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let frames: Vec<_> = (0..3)
            .map(|i| Frame::new(i, store.frames_dir().join(format!("frame_{:04}.jpg", i)), i as f64))
            .collect();

        let mut shuffled = frames.clone();
        shuffled.reverse();
        store.save_frames(&shuffled).unwrap();
        for frame in &frames {
            store.record(&analysis(frame, &format!("note {}", frame.index))).unwrap();
        }

        let loaded = store.load_frames().unwrap();
        assert_eq!(loaded, frames);
        let analyses = store.load_analyses(&loaded).unwrap();
        let texts: Vec<_> = analyses.iter().map(|a| a.response_text.as_str()).collect();
        assert_eq!(texts, vec!["note 0", "note 1", "note 2"]);
        assert!(store.analyses_dir().join("frame_0001.json").is_file());
    }

    #[test]
    fn missing_state_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_frames(),
            Err(CoreError::ResumeStateMissing(_))
        ));

        let frames = vec![Frame::new(0, "frame_0000.jpg", 0.0)];
        store.save_frames(&frames).unwrap();
        assert!(matches!(
            store.load_analyses(&frames),
            Err(CoreError::ResumeStateMissing(_))
        ));
        assert!(store.load_transcript().unwrap().is_none());
    }

    #[test]
    fn clearing_transcript_removes_stale_file() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let transcript = Transcript {
            text: "hello".to_string(),
            segments: Vec::new(),
            language: Some("en".to_string()),
        };

        store.save_transcript(Some(&transcript)).unwrap();
        assert_eq!(store.load_transcript().unwrap(), Some(transcript));

        store.save_transcript(None).unwrap();
        assert!(store.load_transcript().unwrap().is_none());
    }

    #[test]
    fn reset_capture_drops_earlier_frames_and_analyses() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let frames: Vec<_> = (0..4)
            .map(|i| Frame::new(i, store.frames_dir().join(format!("frame_{:04}.jpg", i)), i as f64))
            .collect();
        std::fs::create_dir_all(store.frames_dir()).unwrap();
        for frame in &frames {
            std::fs::write(&frame.path, b"x").unwrap();
            store.record(&analysis(frame, "old")).unwrap();
        }
        store.save_frames(&frames).unwrap();

        store.reset_capture().unwrap();

        assert!(!store.frames_dir().exists());
        assert!(!store.analyses_dir().exists());
        assert!(matches!(
            store.load_frames(),
            Err(CoreError::ResumeStateMissing(_))
        ));
        assert!(store.root().join(LOCK_FILE).is_file());
        store.reset_capture().unwrap();
    }

    #[test]
    fn cleanup_removes_working_directory() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        let store = ArtifactStore::open(&work).unwrap();
        std::fs::create_dir_all(store.frames_dir()).unwrap();
        std::fs::write(store.frames_dir().join("frame_0000.jpg"), b"x").unwrap();
        std::fs::write(store.audio_path(), b"RIFF").unwrap();

        store.cleanup().unwrap();
        assert!(!work.exists());
    }
}
