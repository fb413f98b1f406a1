//! Utility functions

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Audio file extensions the remote service accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "aac", "wma"];

/// Whether a path carries a supported audio extension
pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Find supported audio files under a path, sorted
///
/// A file path returns itself (if supported); a directory is scanned,
/// descending into subdirectories when `recursive` is set. Convenience for
/// callers building batch spec lists from a music folder.
pub fn find_audio_files(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if input.is_file() {
        if is_supported_audio_file(input) {
            files.push(input.to_path_buf());
        }
        return Ok(files);
    }

    collect_audio_files(input, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_audio_files(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_audio_files(&path, recursive, files)?;
            }
        } else if is_supported_audio_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}
