//! Filesystem utilities.
//!
//! Crash-tolerant writes for the result document and work-dir artifacts, and
//! input path checks run before a pipeline starts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Input Validation
// =============================================================================

/// Resolves the video to analyze. Remote URLs are rejected; the capture
/// collaborators only read local files.
pub fn validate_video_input(path: &Path) -> CoreResult<PathBuf> {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Config("video path is empty".to_string()));
    }
    if trimmed.to_ascii_lowercase().contains("://") {
        return Err(CoreError::Config(format!(
            "video must be a local file path, not a URL: {}",
            trimmed
        )));
    }

    let pb = PathBuf::from(trimmed);
    let meta = std::fs::metadata(&pb)
        .map_err(|_| CoreError::Config(format!("video file not found: {}", pb.display())))?;
    if !meta.is_file() {
        return Err(CoreError::Config(format!(
            "video path is not a file: {}",
            pb.display()
        )));
    }
    Ok(pb)
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Writes bytes to a sibling temp file, syncs, then renames over `path`.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_with_suffix(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    replace_file(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Reads and decodes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

fn replace_file(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Rename-over-existing is not atomic everywhere; swap through a backup.
    let bak = sibling_with_suffix(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::Io(e))
        }
    }
}
