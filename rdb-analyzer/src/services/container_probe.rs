//! Container/stream probe adapter
//!
//! Wraps ffprobe behind a narrow interface yielding the technical facts
//! minus tempo. A probe failure is the one fatal per-track condition: no
//! record is written for a file whose container cannot be read.

use rdb_common::model::{TagMap, TechnicalFacts};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Container probe errors (fatal for the track)
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe not runnable: {0}")]
    Spawn(String),

    #[error("ffprobe exited with {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("ffprobe output unparseable: {0}")]
    Parse(String),

    #[error("No audio stream in {0}")]
    NoAudioStream(String),
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// ffprobe-backed container probe.
pub struct ContainerProbe {
    binary: String,
}

impl ContainerProbe {
    pub fn new() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe container and stream metadata for `path`.
    ///
    /// Returns the technical facts skeleton (duration, sample rate,
    /// channels, bitrate, codec, wav-sibling flag) with empty tags and no
    /// tempo; those are filled in by the other technical services.
    pub async fn probe(&self, path: &Path) -> Result<TechnicalFacts, ProbeError> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Parse(e.to_string()))?;

        let audio = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"))
            .ok_or_else(|| ProbeError::NoAudioStream(path.display().to_string()))?;

        let duration_sec = parsed
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| ProbeError::Parse("format.duration missing".to_string()))?;

        Ok(TechnicalFacts {
            duration_sec,
            sample_rate_hz: audio.sample_rate.as_deref().and_then(|s| s.parse().ok()),
            channels: audio.channels,
            bit_rate: parsed.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            codec: audio.codec_name.clone(),
            has_wav_version: has_wav_sibling(path),
            tags: TagMap::default(),
            ..TechnicalFacts::default()
        })
    }
}

impl Default for ContainerProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a `<stem>.wav` sibling exists next to a non-WAV file.
pub fn has_wav_sibling(path: &Path) -> bool {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        return false;
    }
    let wav = path.with_extension("wav");
    wav.exists()
}
