//! Tempo estimation
//!
//! Two strategies, tried in order: a three-window onset-autocorrelation
//! estimate ("thirds"), then a single centered-window autocorrelation
//! fallback. Both work on mono PCM pulled through the [`AudioDecoder`] seam.
//! The embedded `TBPM` tag, when valid, overrides whatever the estimators
//! produce; that override is applied by the technical phase, not here.

use crate::services::decoder::{AudioDecoder, DecodeError};
use rdb_common::model::TempoSource;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const ANALYSIS_RATE: u32 = 44_100;
const FRAME_SIZE: usize = 1024;
const HOP_SIZE: usize = 256;

/// Estimator search range.
const BPM_MIN: f64 = 50.0;
const BPM_MAX: f64 = 200.0;

/// Comfort range window tempos are folded into.
const FOLD_LOW: f64 = 70.0;
const FOLD_HIGH: f64 = 180.0;

/// Half/double disambiguation prior for the ACF fallback.
const TEMPO_PRIOR: f64 = 120.0;

/// Probe hint labels that mark a track as percussive.
const DRUM_HINTS: &[&str] = &["drums", "drum kit", "percussion"];

/// Probe hint labels that trigger the rock-bias override.
const ROCK_HINTS: &[&str] = &["guitar", "electric guitar", "brass"];

/// Estimator result, before any tag override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    pub bpm: u32,
    pub source: TempoSource,
}

/// Onset-autocorrelation tempo estimator.
pub struct TempoEstimator {
    decoder: Arc<dyn AudioDecoder>,
}

impl TempoEstimator {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Estimate the track tempo.
    ///
    /// Returns `None` when both strategies fail; that is non-fatal and the
    /// record carries `bpm = null`.
    pub async fn estimate(
        &self,
        path: &Path,
        duration_sec: f64,
        hints: &BTreeMap<String, bool>,
    ) -> Option<TempoEstimate> {
        if duration_sec <= 0.0 {
            return None;
        }

        let drums = has_any_hint(hints, DRUM_HINTS);
        if let Some(bpm) = self.thirds_bpm(path, duration_sec, drums).await {
            return Some(TempoEstimate {
                bpm,
                source: TempoSource::Thirds,
            });
        }

        let rocky = has_any_hint(hints, ROCK_HINTS);
        if let Some(bpm) = self.acf_fallback_bpm(path, duration_sec, rocky).await {
            return Some(TempoEstimate {
                bpm,
                source: TempoSource::Acf,
            });
        }

        None
    }

    /// Thirds strategy: one window per third of the track, each ~¼ of a
    /// third long, widened once by ×1.5 (up to 60 s) when the first pull
    /// comes back shorter than 6 s. The result is the rounded mean of the
    /// per-window folded tempos.
    async fn thirds_bpm(&self, path: &Path, duration_sec: f64, drums: bool) -> Option<u32> {
        let base_len = (duration_sec / 12.0).min(60.0);
        if base_len < 1.0 {
            return None;
        }

        let centers = [
            duration_sec / 6.0,
            duration_sec / 2.0,
            duration_sec * 5.0 / 6.0,
        ];

        let mut window_bpms = Vec::new();
        for center in centers {
            match self.window_bpm(path, duration_sec, center, base_len).await {
                Ok(Some(raw)) => {
                    let folded = fold_into_range(raw);
                    window_bpms.push(normalize_for_percussion(folded, drums));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(file = %path.display(), error = %e, "Tempo window decode failed");
                }
            }
        }

        if window_bpms.is_empty() {
            return None;
        }
        let mean = window_bpms.iter().sum::<f64>() / window_bpms.len() as f64;
        Some(mean.round() as u32)
    }

    async fn window_bpm(
        &self,
        path: &Path,
        duration_sec: f64,
        center: f64,
        base_len: f64,
    ) -> Result<Option<f64>, DecodeError> {
        let mut len = base_len;
        let offset = (center - len / 2.0).max(0.0);
        let mut samples = self
            .decoder
            .decode_window(path, offset, len, ANALYSIS_RATE)
            .await?;

        // One-time widen when the pull came back short.
        if (samples.len() as f64) < 6.0 * ANALYSIS_RATE as f64 {
            len = (len * 1.5).min(60.0);
            let offset = (center - len / 2.0).max(0.0).min(duration_sec);
            samples = self
                .decoder
                .decode_window(path, offset, len, ANALYSIS_RATE)
                .await?;
        }

        if (samples.len() as f64) < 2.0 * ANALYSIS_RATE as f64 {
            return Ok(None);
        }

        let envelope = onset_envelope(&samples, FRAME_SIZE, HOP_SIZE);
        let frame_rate = ANALYSIS_RATE as f64 / HOP_SIZE as f64;
        Ok(acf_peak(&envelope, frame_rate, BPM_MIN, BPM_MAX).map(|(bpm, _)| bpm))
    }

    /// ACF fallback: one centered window of
    /// `min(60, max(20, 0.4 · duration))` seconds, decimated by 2.
    async fn acf_fallback_bpm(&self, path: &Path, duration_sec: f64, rocky: bool) -> Option<u32> {
        let len = (0.4 * duration_sec).clamp(20.0, 60.0).min(duration_sec);
        let offset = ((duration_sec - len) / 2.0).max(0.0);

        let samples = match self
            .decoder
            .decode_window(path, offset, len, ANALYSIS_RATE)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "ACF fallback decode failed");
                return None;
            }
        };
        if samples.len() < FRAME_SIZE * 4 {
            return None;
        }

        let decimated: Vec<f32> = samples.iter().step_by(2).copied().collect();
        let frame_rate = (ANALYSIS_RATE / 2) as f64 / HOP_SIZE as f64;
        let envelope = onset_envelope(&decimated, FRAME_SIZE, HOP_SIZE);
        let (raw, confidence) = acf_peak(&envelope, frame_rate, BPM_MIN, BPM_MAX)?;

        let mut chosen = select_acf_candidate(raw);
        if rocky && chosen < 110.0 && raw >= 120.0 && raw.round() <= BPM_MAX {
            chosen = raw.round();
        }

        tracing::debug!(
            file = %path.display(),
            raw_bpm = raw,
            chosen_bpm = chosen,
            confidence,
            "ACF fallback tempo"
        );
        Some(chosen.round() as u32)
    }
}

fn has_any_hint(hints: &BTreeMap<String, bool>, labels: &[&str]) -> bool {
    hints
        .iter()
        .any(|(label, present)| *present && labels.iter().any(|l| label.eq_ignore_ascii_case(l)))
}

/// Rectified per-frame energy differences, peak-normalized.
fn onset_envelope(samples: &[f32], frame: usize, hop: usize) -> Vec<f32> {
    if samples.len() < frame {
        return Vec::new();
    }
    let mut energies = Vec::with_capacity(samples.len() / hop);
    let mut start = 0;
    while start + frame <= samples.len() {
        let energy: f32 = samples[start..start + frame].iter().map(|s| s * s).sum();
        energies.push(energy / frame as f32);
        start += hop;
    }

    let mut flux: Vec<f32> = energies
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).max(0.0))
        .collect();

    let peak = flux.iter().cloned().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for value in &mut flux {
            *value /= peak;
        }
    }
    flux
}

/// Best-lag autocorrelation over the lag range for `[min_bpm, max_bpm]`.
///
/// Returns `(bpm, confidence)` with `confidence = best / (best + second)`,
/// the second-best peak taken outside the immediate neighborhood of the
/// winner.
fn acf_peak(envelope: &[f32], frame_rate: f64, min_bpm: f64, max_bpm: f64) -> Option<(f64, f64)> {
    let lag_min = ((frame_rate * 60.0) / max_bpm).floor() as usize;
    let lag_max = ((frame_rate * 60.0) / min_bpm).ceil() as usize;
    if envelope.len() <= lag_max || lag_min < 1 {
        return None;
    }

    let mut correlations = Vec::with_capacity(lag_max - lag_min + 1);
    for lag in lag_min..=lag_max {
        let mut sum = 0.0f64;
        for i in 0..envelope.len() - lag {
            sum += f64::from(envelope[i]) * f64::from(envelope[i + lag]);
        }
        correlations.push((lag, sum));
    }

    let (best_lag, best) = correlations
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    if best <= 0.0 {
        return None;
    }

    let second = correlations
        .iter()
        .filter(|(lag, _)| lag.abs_diff(best_lag) > 2)
        .map(|(_, value)| *value)
        .fold(0.0f64, f64::max);

    let bpm = frame_rate * 60.0 / best_lag as f64;
    let confidence = best / (best + second);
    Some((bpm, confidence))
}

/// Fold a raw tempo into [70, 180] by repeated doubling/halving.
fn fold_into_range(mut bpm: f64) -> f64 {
    if bpm <= 0.0 {
        return bpm;
    }
    while bpm < FOLD_LOW {
        bpm *= 2.0;
    }
    while bpm > FOLD_HIGH {
        bpm /= 2.0;
    }
    bpm
}

/// Percussion-aware disambiguation of a folded window tempo.
///
/// With drums present, a folded tempo in [70, 95] usually sits an octave
/// low; without drums, [135, 170] usually sits an octave high.
fn normalize_for_percussion(folded: f64, drums: bool) -> f64 {
    if drums {
        if (70.0..=95.0).contains(&folded) {
            let doubled = folded * 2.0;
            if (100.0..=190.0).contains(&doubled) {
                return doubled;
            }
        }
    } else if (135.0..=170.0).contains(&folded) {
        let halved = folded / 2.0;
        if (68.0..=100.0).contains(&halved) {
            return halved;
        }
    }
    folded
}

/// Pick among `{raw, raw/2, raw·2}` the in-range candidate nearest the
/// 120 BPM prior, raw winning ties.
fn select_acf_candidate(raw: f64) -> f64 {
    let mut chosen = raw;
    let mut best_distance = (raw - TEMPO_PRIOR).abs();
    for candidate in [raw / 2.0, raw * 2.0] {
        if !(BPM_MIN..=BPM_MAX).contains(&candidate) {
            continue;
        }
        let distance = (candidate - TEMPO_PRIOR).abs();
        if distance < best_distance {
            best_distance = distance;
            chosen = candidate;
        }
    }
    chosen
}

/// Alt tempos, emitted only when they land within [50, 200].
pub fn alt_tempos(bpm: u32) -> (Option<u32>, Option<u32>) {
    let half = (f64::from(bpm) / 2.0).round() as u32;
    let double = bpm * 2;
    let in_range = |v: u32| (50..=200).contains(&v);
    (
        in_range(half).then_some(half),
        in_range(double).then_some(double),
    )
}
