use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Files at or below this size are presumed to be failed or partial writes
/// from an interrupted generation call.
pub const MIN_VALID_BYTES: u64 = 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// Scans `base` + each extension, in order, for an artifact worth keeping.
///
/// A candidate strictly larger than [`MIN_VALID_BYTES`] is a hit and is
/// returned without looking further. An undersized candidate is deleted
/// (delete failures are logged, not fatal) and the scan continues. `None`
/// means the caller must regenerate; the filesystem is the only record of
/// what has already been produced.
pub fn find_valid_artifact(base: &Path, extensions: &[&str]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = PathBuf::from(format!("{}.{}", base.display(), ext));
        let Ok(meta) = fs::metadata(&candidate) else {
            continue;
        };

        if meta.len() > MIN_VALID_BYTES {
            return Some(candidate);
        }

        warn!(
            "Found corrupt/small artifact {}. Deleting to regenerate.",
            candidate.display()
        );
        if let Err(e) = fs::remove_file(&candidate) {
            warn!("Failed to delete {}: {}", candidate.display(), e);
        }
    }
    None
}
