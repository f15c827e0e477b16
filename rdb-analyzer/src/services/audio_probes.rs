//! Mix-level audio probes
//!
//! Runs the window-probe helper over a few spots in the track and merges the
//! per-window classifier labels into a boolean hint map. Hints feed the
//! tempo estimator's percussion handling and the creative prompt; they are
//! advisory and every failure here is isolated. Each window is bounded by a
//! 15 s wall clock; a timed-out window contributes no data.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Wall-clock bound per probe window.
const WINDOW_TIMEOUT: Duration = Duration::from_secs(15);

/// Window positions as fractions of the track duration.
const WINDOW_POSITIONS: &[f64] = &[0.2, 0.5, 0.8];

/// Probe window length in seconds.
const WINDOW_LEN_SEC: f64 = 10.0;

/// Minimum CLAP score for a label to become a positive hint.
const CLAP_HINT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
pub struct ClapLabel {
    pub label: String,
    pub score: f64,
}

/// One probe window's classifier output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeWindow {
    pub clap_top: Vec<ClapLabel>,
    pub ast_labels: Vec<String>,
}

/// Merged probe result for a track.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    /// Label → detected, lowercased labels.
    pub hints: BTreeMap<String, bool>,
    pub per_window: Vec<ProbeWindow>,
    /// Best CLAP score seen per label.
    pub scores: BTreeMap<String, f64>,
    /// `"ok"` when at least one window produced data, else `"skipped"`.
    pub status: String,
}

impl ProbeOutcome {
    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            ..Self::default()
        }
    }
}

/// Spawns the probe helper per window and merges its output.
pub struct AudioProbeRunner {
    /// Helper invocation, e.g. `["python3", "probe_windows.py"]`.
    /// With no helper configured the probes are skipped entirely.
    command: Option<Vec<String>>,
}

impl AudioProbeRunner {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self { command }
    }

    pub fn disabled() -> Self {
        Self { command: None }
    }

    /// Probe `path`, never failing the track.
    pub async fn run(&self, path: &Path, duration_sec: f64) -> ProbeOutcome {
        let Some(command) = &self.command else {
            return ProbeOutcome::skipped();
        };
        if duration_sec <= 0.0 {
            return ProbeOutcome::skipped();
        }

        let mut windows = Vec::new();
        for position in WINDOW_POSITIONS {
            let offset = (duration_sec * position - WINDOW_LEN_SEC / 2.0).max(0.0);
            match self.run_window(command, path, offset).await {
                Some(window) => windows.push(window),
                None => {
                    tracing::debug!(
                        file = %path.display(),
                        offset,
                        "Probe window contributed no data"
                    );
                }
            }
        }

        if windows.is_empty() {
            return ProbeOutcome::skipped();
        }

        let (hints, scores) = merge_windows(&windows);
        ProbeOutcome {
            hints,
            per_window: windows,
            scores,
            status: "ok".to_string(),
        }
    }

    async fn run_window(
        &self,
        command: &[String],
        path: &Path,
        offset_sec: f64,
    ) -> Option<ProbeWindow> {
        let (program, args) = command.split_first()?;
        let mut child = Command::new(program)
            .args(args)
            .arg("--audio")
            .arg(path)
            .args(["--offset", &format!("{offset_sec:.2}")])
            .args(["--duration", &format!("{WINDOW_LEN_SEC:.0}")])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .ok()?;

        let mut stdout = child.stdout.take()?;
        let waited = tokio::time::timeout(WINDOW_TIMEOUT, async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.ok()?;
            let status = child.wait().await.ok()?;
            status.success().then_some(buf)
        })
        .await;

        match waited {
            Ok(Some(buf)) => serde_json::from_slice(&buf).ok(),
            Ok(None) => None,
            Err(_) => {
                // Timed out: kill the child, contribute nothing.
                let _ = child.start_kill();
                None
            }
        }
    }
}

/// Merge per-window labels into the hint and score maps.
pub fn merge_windows(windows: &[ProbeWindow]) -> (BTreeMap<String, bool>, BTreeMap<String, f64>) {
    let mut hints = BTreeMap::new();
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();

    for window in windows {
        for clap in &window.clap_top {
            let label = clap.label.trim().to_lowercase();
            if label.is_empty() {
                continue;
            }
            let best = scores.entry(label.clone()).or_insert(0.0);
            if clap.score > *best {
                *best = clap.score;
            }
            if clap.score >= CLAP_HINT_THRESHOLD {
                hints.insert(label, true);
            } else {
                hints.entry(label).or_insert(false);
            }
        }
        for label in &window.ast_labels {
            let label = label.trim().to_lowercase();
            if !label.is_empty() {
                hints.insert(label, true);
            }
        }
    }

    (hints, scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(clap: &[(&str, f64)], ast: &[&str]) -> ProbeWindow {
        ProbeWindow {
            clap_top: clap
                .iter()
                .map(|(label, score)| ClapLabel {
                    label: label.to_string(),
                    score: *score,
                })
                .collect(),
            ast_labels: ast.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn hints_require_threshold_or_ast_presence() {
        let windows = vec![
            window(&[("Drums", 0.8), ("piano", 0.2)], &[]),
            window(&[("piano", 0.3)], &["electric guitar"]),
        ];
        let (hints, scores) = merge_windows(&windows);
        assert_eq!(hints.get("drums"), Some(&true));
        assert_eq!(hints.get("piano"), Some(&false));
        assert_eq!(hints.get("electric guitar"), Some(&true));
        assert!((scores["piano"] - 0.3).abs() < 1e-9);
        assert!((scores["drums"] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn later_window_can_promote_hint() {
        let windows = vec![window(&[("brass", 0.1)], &[]), window(&[("brass", 0.7)], &[])];
        let (hints, _) = merge_windows(&windows);
        assert_eq!(hints.get("brass"), Some(&true));
    }

    #[tokio::test]
    async fn disabled_runner_skips() {
        let outcome = AudioProbeRunner::disabled()
            .run(Path::new("x.mp3"), 120.0)
            .await;
        assert_eq!(outcome.status, "skipped");
        assert!(outcome.hints.is_empty());
    }

    #[test]
    fn probe_window_json_shape() {
        let json = r#"{"clap_top":[{"label":"drums","score":0.9}],"ast_labels":["bass guitar"]}"#;
        let parsed: ProbeWindow = serde_json::from_str(json).expect("parses");
        assert_eq!(parsed.clap_top[0].label, "drums");
        assert_eq!(parsed.ast_labels, ["bass guitar".to_string()]);
    }
}
