//! Library persistence
//!
//! Owns `RhythmDB.json` (the main store) and `CriteriaDB.json` (the facet
//! index). Each file has a single writer guarded by its own async lock;
//! reads are point-in-time snapshots. Every write goes through the
//! tmp-fsync-rename pattern so a crash never leaves a partial file.

mod criteria;
mod sidecar;

pub use criteria::build_criteria;
pub use sidecar::{build_document, sidecar_path, write_sidecar};

use chrono::Utc;
use rdb_common::model::{CriteriaStore, MainStore, TrackRecord};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub const MAIN_STORE_FILE: &str = "RhythmDB.json";
pub const CRITERIA_STORE_FILE: &str = "CriteriaDB.json";

/// Store I/O errors (fatal for the affected upsert or rebuild)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The library's two JSON stores, rooted in one folder.
pub struct LibraryStore {
    folder: PathBuf,
    main_lock: tokio::sync::Mutex<()>,
    criteria_lock: tokio::sync::Mutex<()>,
}

impl LibraryStore {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            main_lock: tokio::sync::Mutex::new(()),
            criteria_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn main_store_path(&self) -> PathBuf {
        self.folder.join(MAIN_STORE_FILE)
    }

    pub fn criteria_store_path(&self) -> PathBuf {
        self.folder.join(CRITERIA_STORE_FILE)
    }

    /// Snapshot-read the main store. A missing file is an empty store.
    pub async fn load_main(&self) -> Result<MainStore, StoreError> {
        read_json_or_default(&self.main_store_path()).await
    }

    /// Merge `incoming` into the main store under its track key.
    ///
    /// Returns the merged record as persisted. `created_at` survives from
    /// the first write; `updated_at` always moves.
    pub async fn upsert(&self, incoming: &TrackRecord) -> Result<TrackRecord, StoreError> {
        let _guard = self.main_lock.lock().await;
        let mut store = read_json_or_default::<MainStore>(&self.main_store_path()).await?;

        let merged = match store.tracks.get(&incoming.key) {
            Some(existing) => merge_records(existing, incoming),
            None => {
                let mut fresh = incoming.clone();
                let now = Utc::now();
                fresh.created_at = now;
                fresh.updated_at = now;
                finish_merge(&mut fresh);
                fresh
            }
        };

        store.tracks.insert(merged.key.clone(), merged.clone());
        tokio::fs::create_dir_all(&self.folder).await?;
        write_json_atomic(&self.main_store_path(), &store).await?;
        tracing::debug!(key = %merged.key, "Upserted track record");
        Ok(merged)
    }

    /// Rebuild the criteria store by a full sweep of the main store.
    ///
    /// Pure in the main store: successive rebuilds without intervening
    /// upserts produce byte-identical output.
    pub async fn rebuild_criteria(&self) -> Result<CriteriaStore, StoreError> {
        let _guard = self.criteria_lock.lock().await;
        let main = self.load_main().await?;
        let criteria = build_criteria(&main);
        tokio::fs::create_dir_all(&self.folder).await?;
        write_json_atomic(&self.criteria_store_path(), &criteria).await?;
        tracing::debug!(
            genres = criteria.genre.len(),
            instruments = criteria.instrument.len(),
            "Criteria store rebuilt"
        );
        Ok(criteria)
    }
}

/// Merge an incoming record over an existing one: non-empty scalars win,
/// creative list fields union (existing order first), the instrument
/// precedence resolves `creative.instrument`.
fn merge_records(existing: &TrackRecord, incoming: &TrackRecord) -> TrackRecord {
    let mut merged = existing.clone();

    merged.path = pick_string(&existing.path, &incoming.path);
    merged.file = pick_string(&existing.file, &incoming.file);
    merged.analyzed_at = incoming.analyzed_at;
    merged.updated_at = Utc::now();
    if incoming.waveform_png.is_some() {
        merged.waveform_png = incoming.waveform_png.clone();
    }
    if !incoming.creative_status.is_empty() {
        merged.creative_status = incoming.creative_status.clone();
    }

    merge_technical(&mut merged, incoming);

    merged.creative.genre = union_lists(&existing.creative.genre, &incoming.creative.genre);
    merged.creative.mood = union_lists(&existing.creative.mood, &incoming.creative.mood);
    merged.creative.vocals = union_lists(&existing.creative.vocals, &incoming.creative.vocals);
    merged.creative.theme = union_lists(&existing.creative.theme, &incoming.creative.theme);
    if !incoming.creative.suggested_instruments.is_empty() {
        merged.creative.suggested_instruments = incoming.creative.suggested_instruments.clone();
    }
    if !incoming.creative.lyric_themes.is_empty() {
        merged.creative.lyric_themes = incoming.creative.lyric_themes.clone();
    }
    if !incoming.creative.narrative.is_empty() {
        merged.creative.narrative = incoming.creative.narrative.clone();
    }
    if incoming.creative.confidence > 0.0 {
        merged.creative.confidence = incoming.creative.confidence;
    }

    if !incoming.analysis.instruments.is_empty() {
        merged.analysis.instruments = incoming.analysis.instruments.clone();
    }
    if !incoming.analysis.final_instruments.is_empty() {
        merged.analysis.final_instruments = incoming.analysis.final_instruments.clone();
    }
    if incoming.analysis.decision_trace.is_some() {
        merged.analysis.decision_trace = incoming.analysis.decision_trace.clone();
    }
    if incoming.analysis.electronic_elements.is_some() {
        merged.analysis.electronic_elements = incoming.analysis.electronic_elements.clone();
    }

    finish_merge(&mut merged);
    merged
}

/// Post-merge fixups shared by the insert and update paths.
fn finish_merge(record: &mut TrackRecord) {
    record.creative.instrument = record.resolved_instruments().to_vec();
}

fn merge_technical(merged: &mut TrackRecord, incoming: &TrackRecord) {
    let t = &incoming.technical;
    let out = &mut merged.technical;
    if t.duration_sec > 0.0 {
        out.duration_sec = t.duration_sec;
    }
    out.sample_rate_hz = t.sample_rate_hz.or(out.sample_rate_hz);
    out.channels = t.channels.or(out.channels);
    out.bit_rate = t.bit_rate.or(out.bit_rate);
    if t.codec.is_some() {
        out.codec = t.codec.clone();
    }
    out.has_wav_version = t.has_wav_version || out.has_wav_version;
    if t.bpm.is_some() {
        out.bpm = t.bpm;
        out.bpm_source = t.bpm_source;
        out.bpm_alt_half = t.bpm_alt_half;
        out.bpm_alt_double = t.bpm_alt_double;
    }
    out.estimated_bpm = t.estimated_bpm.or(out.estimated_bpm);
    if t.tags != Default::default() {
        out.tags = t.tags.clone();
    }
}

fn pick_string(existing: &str, incoming: &str) -> String {
    if incoming.is_empty() {
        existing.to_string()
    } else {
        incoming.to_string()
    }
}

/// Set union preserving existing ordering first, appending new entries.
fn union_lists(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut out = existing.to_vec();
    for entry in incoming {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(entry)) {
            out.push(entry.clone());
        }
    }
    out
}

async fn read_json_or_default<T>(path: &Path) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write JSON via tmp file, fsync, rename.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_preserves_existing_order() {
        let merged = union_lists(
            &["Rock".to_string(), "Funk".to_string()],
            &["funk".to_string(), "Electronic".to_string()],
        );
        assert_eq!(merged, ["Rock", "Funk", "Electronic"]);
    }

    #[test]
    fn merge_keeps_old_scalars_when_incoming_empty() {
        let mut existing = TrackRecord::default();
        existing.key = "k".into();
        existing.technical.bpm = Some(120);
        existing.technical.codec = Some("mp3".into());
        existing.creative.narrative = "old words".into();

        let mut incoming = TrackRecord::default();
        incoming.key = "k".into();

        let merged = merge_records(&existing, &incoming);
        assert_eq!(merged.technical.bpm, Some(120));
        assert_eq!(merged.technical.codec.as_deref(), Some("mp3"));
        assert_eq!(merged.creative.narrative, "old words");
    }

    #[test]
    fn merge_resolves_creative_instrument_by_precedence() {
        let mut existing = TrackRecord::default();
        existing.key = "k".into();
        existing.creative.suggested_instruments = vec!["Piano".into()];

        let mut incoming = TrackRecord::default();
        incoming.key = "k".into();
        incoming.analysis.final_instruments = vec!["Electric Guitar".into()];

        let merged = merge_records(&existing, &incoming);
        assert_eq!(merged.creative.instrument, ["Electric Guitar".to_string()]);
    }
}
