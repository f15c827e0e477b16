//! Per-file sidecar writer
//!
//! Projects the in-memory record into the flat `<stem>.json` document
//! beside the audio file. The sidecar is always rewritten whole, through
//! the same tmp-and-rename pattern as the stores.

use super::{write_json_atomic, StoreError};
use rdb_common::model::{EnsembleSection, TrackDocument, TrackRecord};
use std::path::{Path, PathBuf};

/// Sidecar path: the audio path with a `.json` extension.
pub fn sidecar_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("json")
}

/// Build the flat per-file document from a record.
///
/// `ensemble` carries the run facts (`used_demucs`, `mode`) that live only
/// in the sidecar, not in the store record.
pub fn build_document(record: &TrackRecord, ensemble: &EnsembleSection) -> TrackDocument {
    let technical = &record.technical;
    TrackDocument {
        file: record.file.clone(),
        path: record.path.clone(),
        analyzed_at: record.analyzed_at,
        duration_sec: technical.duration_sec,
        sample_rate_hz: technical.sample_rate_hz,
        channels: technical.channels,
        bit_rate: technical.bit_rate,
        title: technical.tags.title.clone(),
        id3: technical.tags.clone(),
        has_wav_version: technical.has_wav_version,
        estimated_tempo_bpm: technical.estimated_bpm,
        tempo_bpm: technical.bpm,
        bpm: technical.bpm,
        tempo_source: technical.bpm_source,
        tempo_alt_half_bpm: technical.bpm_alt_half,
        tempo_alt_double_bpm: technical.bpm_alt_double,
        creative: record.creative.clone(),
        creative_status: record.creative_status.clone(),
        instruments: record.analysis.instruments.clone(),
        final_instruments: record.analysis.final_instruments.clone(),
        instruments_ensemble: EnsembleSection {
            used_demucs: ensemble.used_demucs,
            mode: ensemble.mode.clone(),
            decision_trace: record.analysis.decision_trace.clone().unwrap_or_default(),
            electronic_elements: record.analysis.electronic_elements.clone(),
        },
        waveform_png: record.waveform_png.clone(),
    }
}

/// Write the sidecar document beside the audio file.
pub async fn write_sidecar(
    audio_path: &Path,
    document: &TrackDocument,
) -> Result<PathBuf, StoreError> {
    let path = sidecar_path(audio_path);
    write_json_atomic(&path, document).await?;
    Ok(path)
}
