//! Audio file discovery
//!
//! Expands the submitted paths into the set of analyzable audio files.
//! Directories are walked recursively; single files are admitted when their
//! extension is supported.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Supported audio extensions (lowercase, without dot).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aif", "aiff"];

/// File scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// File exists but its extension is not a supported audio format
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(PathBuf),
}

/// Recursive audio file scanner with system-file ignore patterns.
pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                "node_modules".to_string(),
            ],
        }
    }

    /// Expand files and directories into a deduplicated, sorted file list.
    ///
    /// Unsupported files inside a scanned directory are skipped silently;
    /// an explicitly submitted unsupported file is an error.
    pub fn scan(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for input in inputs {
            if !input.exists() {
                return Err(ScanError::PathNotFound(input.clone()));
            }
            if input.is_file() {
                if !is_audio_file(input) {
                    return Err(ScanError::UnsupportedFile(input.clone()));
                }
                if seen.insert(input.clone()) {
                    files.push(input.clone());
                }
                continue;
            }

            let walker = WalkDir::new(input)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| !self.is_ignored(entry));

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if entry.file_type().is_file() && is_audio_file(path) {
                            let path = path.to_path_buf();
                            if seen.insert(path.clone()) {
                                files.push(path);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Error accessing entry during scan");
                    }
                }
            }
        }

        files.sort();
        tracing::debug!(count = files.len(), "Scan complete");
        Ok(files)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') && name.len() > 1 && entry.depth() > 0 {
            return true;
        }
        self.ignore_patterns.iter().any(|p| p == name.as_ref())
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the path carries one of the supported audio extensions.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            AUDIO_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extension_gate_is_case_insensitive() {
        assert!(is_audio_file(Path::new("a/B.MP3")));
        assert!(is_audio_file(Path::new("a/b.Aiff")));
        assert!(!is_audio_file(Path::new("a/b.flac")));
        assert!(!is_audio_file(Path::new("a/noext")));
    }

    #[test]
    fn scans_directories_recursively_and_skips_hidden() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).expect("mkdir");
        fs::write(dir.path().join("one.mp3"), b"x").expect("write");
        fs::write(sub.join("two.wav"), b"x").expect("write");
        fs::write(sub.join("skip.txt"), b"x").expect("write");
        let hidden = dir.path().join(".hidden");
        fs::create_dir(&hidden).expect("mkdir");
        fs::write(hidden.join("three.mp3"), b"x").expect("write");

        let files = FileScanner::new()
            .scan(&[dir.path().to_path_buf()])
            .expect("scan");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_audio_file(f)));
    }

    #[test]
    fn explicit_unsupported_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let txt = dir.path().join("notes.txt");
        fs::write(&txt, b"x").expect("write");
        let err = FileScanner::new().scan(&[txt.clone()]).unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedFile(p) if p == txt));
    }
}
