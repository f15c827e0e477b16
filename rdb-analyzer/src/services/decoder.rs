//! PCM window decoding
//!
//! The tempo estimator pulls short mono windows of f32 PCM through the
//! [`AudioDecoder`] seam. Production decoding is delegated to an ffmpeg
//! child emitting raw f32le samples; tests substitute synthetic signals.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Decoder errors (non-fatal; the tempo stage degrades to `bpm = null`)
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("ffmpeg not runnable: {0}")]
    Spawn(String),

    #[error("ffmpeg exited with {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Decoded stream empty")]
    Empty,
}

/// Seam for pulling mono f32 PCM windows out of an audio file.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode `duration_sec` seconds starting at `offset_sec`, resampled to
    /// `sample_rate` Hz mono. May return fewer samples than requested near
    /// the end of the file.
    async fn decode_window(
        &self,
        path: &Path,
        offset_sec: f64,
        duration_sec: f64,
        sample_rate: u32,
    ) -> Result<Vec<f32>, DecodeError>;
}

/// ffmpeg-backed decoder.
pub struct FfmpegDecoder {
    binary: String,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode_window(
        &self,
        path: &Path,
        offset_sec: f64,
        duration_sec: f64,
        sample_rate: u32,
    ) -> Result<Vec<f32>, DecodeError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error"])
            .args(["-ss", &format!("{offset_sec:.3}")])
            .args(["-t", &format!("{duration_sec:.3}")])
            .arg("-i")
            .arg(path)
            .args(["-ac", "1"])
            .args(["-ar", &sample_rate.to_string()])
            .args(["-f", "f32le", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DecodeError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(DecodeError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let samples = bytes_to_f32(&output.stdout);
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(samples)
    }
}

fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_conversion_round_trips() {
        let samples = [0.0f32, 0.5, -1.0, 0.25];
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(bytes_to_f32(&bytes), samples);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let mut bytes = 1.0f32.to_le_bytes().to_vec();
        bytes.push(0xFF);
        assert_eq!(bytes_to_f32(&bytes), vec![1.0]);
    }
}
