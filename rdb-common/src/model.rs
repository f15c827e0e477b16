//! Persisted data model
//!
//! Shared shapes for the per-track analysis record, the main store
//! (`RhythmDB.json`), the criteria store (`CriteriaDB.json`) and the flat
//! per-file sidecar document written next to each audio file.
//!
//! Serialization notes: every struct tolerates missing fields on read
//! (`serde(default)`) so stores written by older versions keep loading, and
//! empty collections are skipped on write to keep the JSON stores small.
//! Map-backed fields use `BTreeMap` so two serializations of the same data
//! are byte-identical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Embedded tag fields read from the audio file (ID3 / AIFF chunks).
///
/// Tag reading is best-effort: a file with no readable tags yields the
/// default (all-empty) map and the track still analyzes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Genre strings, already split on `;` and `/` separators.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genre: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    /// Raw `TBPM` frame text, kept verbatim; the tempo stage parses it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbpm: Option<String>,
    /// Musical key (`TKEY` / InitialKey), verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Mood tag (`TMOO`), verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

/// Where the final BPM value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoSource {
    /// Three-window onset-autocorrelation estimate.
    Thirds,
    /// Single centered-window autocorrelation fallback.
    Acf,
    /// Embedded `TBPM` tag override.
    Id3,
}

impl TempoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempoSource::Thirds => "thirds",
            TempoSource::Acf => "acf",
            TempoSource::Id3 => "id3",
        }
    }
}

/// Output of the technical phase: container facts, tags and tempo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalFacts {
    pub duration_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    pub has_wav_version: bool,
    pub tags: TagMap,
    /// Final BPM, always within [50, 200] when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm_source: Option<TempoSource>,
    /// Estimator output before any `TBPM` override, for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_bpm: Option<u32>,
    /// Half tempo, emitted only when it lands within [50, 200].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm_alt_half: Option<u32>,
    /// Double tempo, emitted only when it lands within [50, 200].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm_alt_double: Option<u32>,
}

/// Output of the creative (LLM) phase, constrained to the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeFacts {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genre: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mood: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub theme: Vec<String>,
    /// Advisory only: never merged into `analysis.instruments`.
    #[serde(rename = "suggestedInstruments", skip_serializing_if = "Vec::is_empty")]
    pub suggested_instruments: Vec<String>,
    /// Always non-empty; defaults to `["No Vocals"]`.
    pub vocals: Vec<String>,
    /// Cleared whenever vocals is exactly `["No Vocals"]`.
    #[serde(rename = "lyricThemes", skip_serializing_if = "Vec::is_empty")]
    pub lyric_themes: Vec<String>,
    pub narrative: String,
    /// Model self-confidence, coerced into [0, 1].
    pub confidence: f64,
    /// Legacy field kept for records written by earlier store versions;
    /// consulted last in the instrument precedence chain.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instrument: Vec<String>,
}

impl Default for CreativeFacts {
    fn default() -> Self {
        Self {
            genre: Vec::new(),
            mood: Vec::new(),
            theme: Vec::new(),
            suggested_instruments: Vec::new(),
            vocals: vec!["No Vocals".to_string()],
            lyric_themes: Vec::new(),
            narrative: String::new(),
            confidence: 0.0,
            instrument: Vec::new(),
        }
    }
}

/// Per-model window statistics from the ensemble classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStats {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mean_probs: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pos_ratio: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerModelTrace {
    pub panns: ModelStats,
    pub yamnet: ModelStats,
}

/// One booster's audit entry in the decision trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostEntry {
    /// Labels the booster pushed into the instrument list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The classifier's decision audit, carried through to the stores verbatim.
///
/// Unknown fields (window counts, rule thresholds added by newer classifier
/// versions) are preserved via the flattened `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_model: Option<PerModelTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub boosts: BTreeMap<String, BoostEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EeConfidence {
    Low,
    Medium,
    High,
}

/// Electronic-production detection reported by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectronicElements {
    pub detected: bool,
    pub confidence: EeConfidence,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl Default for ElectronicElements {
    fn default() -> Self {
        Self {
            detected: false,
            confidence: EeConfidence::Low,
            reasons: Vec::new(),
        }
    }
}

/// The ensemble classifier's output document, plus the run mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleReport {
    /// Raw instrument labels as emitted (display names, pre-finalization).
    pub instruments: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<String, f64>,
    pub decision_trace: DecisionTrace,
    pub used_demucs: bool,
    /// `"stems"` or `"mix-only"`.
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electronic_elements: Option<ElectronicElements>,
}

/// The instrumentation section of a persisted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisBlock {
    /// Canonical finalized instrument list (authoritative).
    pub instruments: Vec<String>,
    /// Same list, kept under both names for store compatibility.
    pub final_instruments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_trace: Option<DecisionTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electronic_elements: Option<ElectronicElements>,
}

/// A track's durable analysis record, keyed by its normalized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRecord {
    pub key: String,
    /// Real filesystem path, as submitted.
    pub path: String,
    /// Basename of the audio file.
    pub file: String,
    pub analyzed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub technical: TechnicalFacts,
    pub creative: CreativeFacts,
    pub creative_status: String,
    pub analysis: AnalysisBlock,
    /// Legacy root-level lists from older store versions; only consulted by
    /// the instrument precedence chain, never written anew.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instruments: Vec<String>,
    #[serde(rename = "finalInstruments", skip_serializing_if = "Vec::is_empty")]
    pub final_instruments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform_png: Option<String>,
}

impl Default for TrackRecord {
    fn default() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            key: String::new(),
            path: String::new(),
            file: String::new(),
            analyzed_at: epoch,
            created_at: epoch,
            updated_at: epoch,
            technical: TechnicalFacts::default(),
            creative: CreativeFacts::default(),
            creative_status: String::new(),
            analysis: AnalysisBlock::default(),
            instruments: Vec::new(),
            final_instruments: Vec::new(),
            waveform_png: None,
        }
    }
}

impl TrackRecord {
    /// Resolve the track's instrument list by the fixed precedence order:
    /// `analysis.final_instruments` > `analysis.instruments` > root
    /// `finalInstruments` > root `instruments` >
    /// `creative.suggestedInstruments` > `creative.instrument`.
    pub fn resolved_instruments(&self) -> &[String] {
        let chain: [&[String]; 6] = [
            &self.analysis.final_instruments,
            &self.analysis.instruments,
            &self.final_instruments,
            &self.instruments,
            &self.creative.suggested_instruments,
            &self.creative.instrument,
        ];
        for list in chain {
            if !list.is_empty() {
                return list;
            }
        }
        &[]
    }
}

/// `RhythmDB.json`: every analyzed track, keyed by [`crate::keys::track_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainStore {
    pub tracks: BTreeMap<String, TrackRecord>,
}

/// `CriteriaDB.json`: sorted, deduplicated facet value sets for the search UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaStore {
    pub genre: Vec<String>,
    pub mood: Vec<String>,
    pub instrument: Vec<String>,
    pub vocals: Vec<String>,
    pub theme: Vec<String>,
    pub tempo_bands: Vec<String>,
    pub keys: Vec<String>,
    pub artists: Vec<String>,
    pub electronic_elements: Vec<String>,
}

/// The flat per-file JSON document written beside each audio file.
///
/// This is the authoritative projection the search UI and the library store
/// consume; it is always rewritten whole from the in-memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDocument {
    pub file: String,
    pub path: String,
    pub analyzed_at: DateTime<Utc>,
    pub duration_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub id3: TagMap,
    pub has_wav_version: bool,
    /// Estimator output before any tag override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tempo_bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo_source: Option<TempoSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo_alt_half_bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo_alt_double_bpm: Option<u32>,
    pub creative: CreativeFacts,
    pub creative_status: String,
    pub instruments: Vec<String>,
    pub final_instruments: Vec<String>,
    pub instruments_ensemble: EnsembleSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform_png: Option<String>,
}

impl Default for TrackDocument {
    fn default() -> Self {
        Self {
            file: String::new(),
            path: String::new(),
            analyzed_at: DateTime::<Utc>::UNIX_EPOCH,
            duration_sec: 0.0,
            sample_rate_hz: None,
            channels: None,
            bit_rate: None,
            title: None,
            id3: TagMap::default(),
            has_wav_version: false,
            estimated_tempo_bpm: None,
            tempo_bpm: None,
            bpm: None,
            tempo_source: None,
            tempo_alt_half_bpm: None,
            tempo_alt_double_bpm: None,
            creative: CreativeFacts::default(),
            creative_status: String::new(),
            instruments: Vec::new(),
            final_instruments: Vec::new(),
            instruments_ensemble: EnsembleSection::default(),
            waveform_png: None,
        }
    }
}

/// The `instruments_ensemble` block of the per-file document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSection {
    pub used_demucs: bool,
    pub mode: String,
    pub decision_trace: DecisionTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electronic_elements: Option<ElectronicElements>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_precedence_walks_the_chain() {
        let mut record = TrackRecord::default();
        record.creative.instrument = vec!["Piano".into()];
        assert_eq!(record.resolved_instruments(), ["Piano".to_string()]);

        record.creative.suggested_instruments = vec!["Organ".into()];
        assert_eq!(record.resolved_instruments(), ["Organ".to_string()]);

        record.instruments = vec!["Brass".into()];
        assert_eq!(record.resolved_instruments(), ["Brass".to_string()]);

        record.final_instruments = vec!["Strings".into()];
        assert_eq!(record.resolved_instruments(), ["Strings".to_string()]);

        record.analysis.instruments = vec!["Drum Kit (acoustic)".into()];
        assert_eq!(
            record.resolved_instruments(),
            ["Drum Kit (acoustic)".to_string()]
        );

        record.analysis.final_instruments = vec!["Electric Guitar".into()];
        assert_eq!(
            record.resolved_instruments(),
            ["Electric Guitar".to_string()]
        );
    }

    #[test]
    fn creative_defaults_have_no_vocals_marker() {
        let creative = CreativeFacts::default();
        assert_eq!(creative.vocals, ["No Vocals".to_string()]);
        assert!(creative.lyric_themes.is_empty());
    }

    #[test]
    fn ensemble_report_tolerates_sparse_json() {
        let report: EnsembleReport =
            serde_json::from_str(r#"{"instruments":["Piano"],"mode":"mix-only"}"#)
                .expect("sparse report should parse");
        assert_eq!(report.instruments, ["Piano".to_string()]);
        assert!(!report.used_demucs);
        assert!(report.decision_trace.per_model.is_none());
    }

    #[test]
    fn decision_trace_preserves_unknown_fields() {
        let json = r#"{"per_model":{"panns":{"mean_probs":{"piano":0.4},"pos_ratio":{}},"yamnet":{}},"window_sec":5.0}"#;
        let trace: DecisionTrace = serde_json::from_str(json).expect("trace parses");
        let back = serde_json::to_value(&trace).expect("trace serializes");
        assert_eq!(back["window_sec"], 5.0);
    }
}
