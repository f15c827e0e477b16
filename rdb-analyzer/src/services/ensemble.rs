//! Ensemble classifier adapter
//!
//! Spawns the external instrument classifier and parses its output JSON.
//! This adapter never errors outward: a dead classifier resolves to an
//! empty report and the mix-only rescue gets its chance. Booster labels
//! recorded in the decision trace are merged into the raw label list before
//! finalization.

use rdb_common::model::{DecisionTrace, EnsembleReport};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Mix-only rescue gates. Tuned against the classifier's score
/// distribution; kept together so recalibration is a one-place edit.
const RESCUE_MEAN_SUM_MIN: f64 = 0.006;
const RESCUE_POS_SUM_MIN: f64 = 0.02;
const RESCUE_PANNS_POS_BONUS: f64 = 0.06;
const RESCUE_MAX_PICKS: usize = 4;
const RESCUE_MEAN_WEIGHT: f64 = 0.7;
const RESCUE_POS_WEIGHT: f64 = 0.3;

/// Model keys inspected by the rescue, with their display names.
const RESCUE_CANDIDATES: &[(&str, &str)] = &[
    ("electric_guitar", "Electric Guitar"),
    ("acoustic_guitar", "Acoustic Guitar"),
    ("bass_guitar", "Bass Guitar"),
    ("drum_kit", "Drum Kit (acoustic)"),
    ("piano", "Piano"),
    ("organ", "Organ"),
    ("brass", "Brass (section)"),
    ("strings", "Strings (section)"),
];

/// Instrumentation phase result: the (possibly defaulted) report plus any
/// rescue labels, and a status string for the record.
#[derive(Debug, Clone)]
pub struct EnsembleOutcome {
    pub report: EnsembleReport,
    /// Labels salvaged by the mix-only rescue, in rank order.
    pub rescues: Vec<String>,
    /// `"ok"` or a short failure description.
    pub status: String,
}

/// Classifier subprocess runner.
pub struct EnsembleRunner {
    /// Classifier invocation, e.g. `["python3", "instruments_ensemble.py"]`.
    command: Vec<String>,
}

impl EnsembleOutcome {
    /// Empty outcome with a status string, for runs that never happened.
    pub fn skipped(status: impl Into<String>) -> Self {
        let mut report = EnsembleReport::default();
        report.mode = "mix-only".to_string();
        Self {
            report,
            rescues: Vec::new(),
            status: status.into(),
        }
    }
}

impl EnsembleRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Classify `path`. Resolves to a stable shape even on complete failure.
    pub async fn run(&self, path: &Path, demucs: bool) -> EnsembleOutcome {
        let mut report = match self.spawn_classifier(path, demucs).await {
            Ok(report) => report,
            Err(reason) => {
                tracing::warn!(file = %path.display(), reason, "Ensemble classifier failed");
                return EnsembleOutcome::skipped(reason);
            }
        };

        merge_booster_labels(&mut report);

        let rescues = if report.instruments.is_empty() && !report.used_demucs {
            let rescued = rescue_from_trace(&report.decision_trace);
            if !rescued.is_empty() {
                tracing::info!(
                    file = %path.display(),
                    labels = ?rescued,
                    "Mix-only rescue recovered instruments"
                );
            }
            rescued
        } else {
            Vec::new()
        };

        EnsembleOutcome {
            report,
            rescues,
            status: "ok".to_string(),
        }
    }

    async fn spawn_classifier(&self, path: &Path, demucs: bool) -> Result<EnsembleReport, String> {
        let Some((program, args)) = self.command.split_first() else {
            return Err("classifier command not configured".to_string());
        };

        let json_out = tempfile::Builder::new()
            .prefix("ensemble-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| format!("temp file: {e}"))?;

        let output = Command::new(program)
            .args(args)
            .arg("--audio")
            .arg(path)
            .arg("--json-out")
            .arg(json_out.path())
            .args(["--demucs", if demucs { "1" } else { "0" }])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("spawn: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "exit {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.lines().last().unwrap_or("").trim()
            ));
        }

        let contents =
            std::fs::read(json_out.path()).map_err(|e| format!("read output: {e}"))?;
        // Some classifier builds print the document to stdout instead.
        let contents = if contents.is_empty() {
            output.stdout
        } else {
            contents
        };

        serde_json::from_slice(&contents).map_err(|e| format!("parse output: {e}"))
    }
}

/// Append booster-added labels from the decision trace.
fn merge_booster_labels(report: &mut EnsembleReport) {
    let added: Vec<String> = report
        .decision_trace
        .boosts
        .values()
        .flat_map(|entry| entry.added.iter().cloned())
        .collect();
    for label in added {
        if !report
            .instruments
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&label))
        {
            report.instruments.push(label);
        }
    }
}

/// Conservative salvage from per-model statistics when the classifier came
/// back empty without stem separation.
///
/// A candidate passes when the combined means and positive-window ratios
/// clear the gates, or PANNs alone shows a strong positive ratio. Passing
/// candidates rank by `mean·0.7 + pos·0.3`; up to four are emitted.
pub fn rescue_from_trace(trace: &DecisionTrace) -> Vec<String> {
    let Some(per_model) = &trace.per_model else {
        return Vec::new();
    };

    let mut passing: Vec<(f64, &str)> = Vec::new();
    for (key, display) in RESCUE_CANDIDATES {
        let mean_panns = per_model.panns.mean_probs.get(*key).copied().unwrap_or(0.0);
        let mean_yamnet = per_model.yamnet.mean_probs.get(*key).copied().unwrap_or(0.0);
        let pos_panns = per_model.panns.pos_ratio.get(*key).copied().unwrap_or(0.0);
        let pos_yamnet = per_model.yamnet.pos_ratio.get(*key).copied().unwrap_or(0.0);

        let mean = mean_panns + mean_yamnet;
        let pos = pos_panns + pos_yamnet;

        let passes = (mean >= RESCUE_MEAN_SUM_MIN && pos >= RESCUE_POS_SUM_MIN)
            || pos_panns >= RESCUE_PANNS_POS_BONUS;
        if passes {
            let rank = mean * RESCUE_MEAN_WEIGHT + pos * RESCUE_POS_WEIGHT;
            passing.push((rank, display));
        }
    }

    passing.sort_by(|a, b| b.0.total_cmp(&a.0));
    passing
        .into_iter()
        .take(RESCUE_MAX_PICKS)
        .map(|(_, display)| display.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::model::{BoostEntry, ModelStats, PerModelTrace};
    use std::collections::BTreeMap;

    fn trace_with(
        panns_mean: &[(&str, f64)],
        panns_pos: &[(&str, f64)],
        yamnet_mean: &[(&str, f64)],
        yamnet_pos: &[(&str, f64)],
    ) -> DecisionTrace {
        let to_map = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        DecisionTrace {
            per_model: Some(PerModelTrace {
                panns: ModelStats {
                    mean_probs: to_map(panns_mean),
                    pos_ratio: to_map(panns_pos),
                },
                yamnet: ModelStats {
                    mean_probs: to_map(yamnet_mean),
                    pos_ratio: to_map(yamnet_pos),
                },
            }),
            ..DecisionTrace::default()
        }
    }

    #[test]
    fn panns_pos_bonus_branch_rescues() {
        // Combined evidence thin, but PANNs positive ratio clears the bonus gate.
        let trace = trace_with(
            &[("electric_guitar", 0.01)],
            &[("electric_guitar", 0.07)],
            &[("electric_guitar", 0.0)],
            &[("electric_guitar", 0.0)],
        );
        assert_eq!(rescue_from_trace(&trace), ["Electric Guitar".to_string()]);
    }

    #[test]
    fn combined_gate_requires_both_sums() {
        // Mean clears but pos does not, and no bonus.
        let trace = trace_with(
            &[("piano", 0.005)],
            &[("piano", 0.01)],
            &[("piano", 0.002)],
            &[("piano", 0.005)],
        );
        assert!(rescue_from_trace(&trace).is_empty());
    }

    #[test]
    fn rescue_ranks_and_caps_at_four() {
        let keys = ["electric_guitar", "bass_guitar", "drum_kit", "piano", "organ"];
        let mut panns_mean = Vec::new();
        let mut panns_pos = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            panns_mean.push((*key, 0.01 + i as f64 * 0.01));
            panns_pos.push((*key, 0.08));
        }
        let trace = trace_with(&panns_mean, &panns_pos, &[], &[]);
        let rescued = rescue_from_trace(&trace);
        assert_eq!(rescued.len(), 4);
        // Highest combined mean ranks first.
        assert_eq!(rescued[0], "Organ");
    }

    #[test]
    fn no_trace_no_rescue() {
        assert!(rescue_from_trace(&DecisionTrace::default()).is_empty());
    }

    #[test]
    fn booster_labels_merge_without_duplicates() {
        let mut report = EnsembleReport {
            instruments: vec!["Piano".to_string()],
            ..EnsembleReport::default()
        };
        report.decision_trace.boosts.insert(
            "mix_only_core_v2".to_string(),
            BoostEntry {
                added: vec!["piano".to_string(), "Electric Guitar".to_string()],
                extra: BTreeMap::new(),
            },
        );
        merge_booster_labels(&mut report);
        assert_eq!(
            report.instruments,
            ["Piano".to_string(), "Electric Guitar".to_string()]
        );
    }
}
