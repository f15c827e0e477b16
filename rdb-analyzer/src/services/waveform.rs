//! Waveform image cache
//!
//! Renders a small waveform PNG per track into the configured cache
//! directory. Filenames are deterministic (stem plus a 10-char path hash),
//! so concurrent generation for the same key is idempotent and a rerun is a
//! no-op. Failures only cost the thumbnail.

use rdb_common::keys::path_hash;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const WAVEFORM_SIZE: &str = "1000x200";

pub struct WaveformRenderer {
    binary: String,
    cache_dir: PathBuf,
}

impl WaveformRenderer {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            cache_dir,
        }
    }

    /// Deterministic cache path for a track.
    pub fn cache_path(&self, audio_path: &Path) -> PathBuf {
        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "track".to_string());
        let hash = path_hash(&audio_path.to_string_lossy());
        self.cache_dir.join(format!("{stem}_{hash}.png"))
    }

    /// Render (or reuse) the waveform PNG. Returns the image path on
    /// success, `None` on any failure.
    pub async fn render(&self, audio_path: &Path) -> Option<String> {
        let target = self.cache_path(audio_path);
        if target.exists() {
            return Some(target.to_string_lossy().to_string());
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            tracing::warn!(error = %e, "Could not create waveform cache directory");
            return None;
        }

        let result = Command::new(&self.binary)
            .args(["-v", "error", "-y"])
            .arg("-i")
            .arg(audio_path)
            .args([
                "-filter_complex",
                &format!("showwavespic=s={WAVEFORM_SIZE}:colors=0x3b82f6"),
                "-frames:v",
                "1",
            ])
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() && target.exists() => {
                Some(target.to_string_lossy().to_string())
            }
            Ok(output) => {
                tracing::warn!(
                    file = %audio_path.display(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Waveform render failed"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg not runnable for waveform render");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_is_deterministic_across_separator_style() {
        let renderer = WaveformRenderer::new(PathBuf::from("/cache"));
        let a = renderer.cache_path(Path::new("/Music/Song.mp3"));
        let b = renderer.cache_path(Path::new("/Music/Song.mp3"));
        assert_eq!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Song_"));
        assert!(name.ends_with(".png"));
        // stem + underscore + 10 hash chars + ".png"
        assert_eq!(name.len(), "Song_".len() + 10 + ".png".len());
    }
}
