//! Record assembly
//!
//! Builds the partial (technical-only) and final track records from the
//! phase outcomes, runs instrument finalization, and applies the
//! electronic-elements elevation.

use crate::phases::TechnicalOutcome;
use crate::services::creative::CreativeOutcome;
use crate::services::ensemble::EnsembleOutcome;
use crate::services::finalizer::finalize;
use crate::services::taxonomy::{self, ELECTRONIC_GENRES};
use chrono::{DateTime, Utc};
use rdb_common::model::{
    AnalysisBlock, EeConfidence, ElectronicElements, EnsembleSection, TrackRecord,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Build the partial record delivered right after the technical phase.
pub fn assemble_partial(
    path: &Path,
    key: &str,
    technical: &TechnicalOutcome,
    now: DateTime<Utc>,
) -> TrackRecord {
    TrackRecord {
        key: key.to_string(),
        path: path.to_string_lossy().to_string(),
        file: path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default(),
        analyzed_at: now,
        created_at: now,
        updated_at: now,
        technical: technical.facts.clone(),
        ..TrackRecord::default()
    }
}

/// Build the merged record plus the sidecar ensemble section once both
/// background phases have terminated.
pub fn assemble_final(
    path: &Path,
    key: &str,
    technical: &TechnicalOutcome,
    creative: &CreativeOutcome,
    ensemble: &EnsembleOutcome,
    waveform_png: Option<String>,
    now: DateTime<Utc>,
) -> (TrackRecord, EnsembleSection) {
    let report = &ensemble.report;

    // Probe hints only step in as a source of last resort.
    let additional = if report.instruments.is_empty() && ensemble.rescues.is_empty() {
        hint_instruments(&technical.probes.hints)
    } else {
        Vec::new()
    };
    let final_instruments = finalize(&report.instruments, &ensemble.rescues, &additional);

    let electronic_elements = report
        .electronic_elements
        .clone()
        .map(|ee| elevate_electronic(ee, &creative.facts.genre));

    let mut record = assemble_partial(path, key, technical, now);
    record.creative = creative.facts.clone();
    record.creative_status = creative.status.clone();
    record.analysis = AnalysisBlock {
        instruments: final_instruments.clone(),
        final_instruments,
        decision_trace: Some(report.decision_trace.clone()),
        electronic_elements: electronic_elements.clone(),
    };
    record.waveform_png = waveform_png;

    let section = EnsembleSection {
        used_demucs: report.used_demucs,
        mode: report.mode.clone(),
        decision_trace: report.decision_trace.clone(),
        electronic_elements,
    };
    (record, section)
}

/// Map positive probe hints onto canonical instrument labels.
pub fn hint_instruments(hints: &BTreeMap<String, bool>) -> Vec<String> {
    let mut labels = Vec::new();
    for (hint, present) in hints {
        if !present {
            continue;
        }
        if let Some(canonical) = taxonomy::canonical_instrument(hint) {
            let canonical = canonical.to_string();
            if !labels.contains(&canonical) {
                labels.push(canonical);
            }
        }
    }
    labels
}

/// Elevate a detected low-confidence electronic verdict to medium when the
/// creative genres corroborate it.
pub fn elevate_electronic(mut ee: ElectronicElements, genres: &[String]) -> ElectronicElements {
    if ee.detected
        && ee.confidence == EeConfidence::Low
        && genres
            .iter()
            .any(|genre| ELECTRONIC_GENRES.iter().any(|e| e.eq_ignore_ascii_case(genre)))
    {
        ee.confidence = EeConfidence::Medium;
        ee.reasons
            .push("creative genre corroborates electronic production".to_string());
    }
    ee
}
