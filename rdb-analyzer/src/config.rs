//! Analyzer configuration
//!
//! Settings merge in priority order: CLI flags, then environment, then the
//! optional TOML config file, then compiled defaults. The scheduler takes
//! the resolved struct; nothing here is global.

use rdb_common::config::config_file_path;
use serde::Deserialize;
use std::path::PathBuf;

/// Worker-pool degree bounds.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;
pub const DEFAULT_WORKERS: usize = 4;

/// Background phase ordering per track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseMode {
    /// Instrumentation waits for creative on the same track.
    Sequential,
    /// Creative and instrumentation run unordered (default).
    #[default]
    Concurrent,
}

/// Resolved analyzer configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Folder holding `RhythmDB.json` and `CriteriaDB.json`.
    pub library_folder: PathBuf,
    pub tech_workers: usize,
    pub creative_workers: usize,
    pub instrumentation_workers: usize,
    pub mode: PhaseMode,
    /// Base URL of the local chat-completion server.
    pub llm_url: String,
    pub llm_model: String,
    /// Ensemble classifier invocation.
    pub classifier_command: Vec<String>,
    /// Window-probe helper invocation; `None` disables the probes.
    pub probe_command: Option<Vec<String>>,
    /// Ask the classifier for stem separation.
    pub demucs: bool,
    /// Waveform PNG cache folder; `None` disables rendering.
    pub waveform_folder: Option<PathBuf>,
    /// Graceful-shutdown bound for in-flight background phases.
    pub shutdown_grace_secs: u64,
}

impl AnalyzerConfig {
    pub fn with_library_folder(library_folder: PathBuf) -> Self {
        Self {
            library_folder,
            tech_workers: DEFAULT_WORKERS,
            creative_workers: DEFAULT_WORKERS,
            instrumentation_workers: DEFAULT_WORKERS,
            mode: PhaseMode::Concurrent,
            llm_url: "http://127.0.0.1:11434".to_string(),
            llm_model: "llama3".to_string(),
            classifier_command: vec![
                "python3".to_string(),
                "instruments_ensemble.py".to_string(),
            ],
            probe_command: None,
            demucs: false,
            waveform_folder: None,
            shutdown_grace_secs: 30,
        }
    }

    /// Apply the optional TOML config file on top of the defaults.
    pub fn apply_config_file(mut self) -> Self {
        let Some(path) = config_file_path() else {
            return self;
        };
        if !path.exists() {
            return self;
        }
        let file: ConfigFile = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| toml::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable config file");
                return self;
            }
        };

        if let Some(workers) = file.workers {
            self.tech_workers = clamp_workers(workers);
            self.creative_workers = clamp_workers(workers);
            self.instrumentation_workers = clamp_workers(workers);
        }
        if let Some(mode) = file.mode {
            self.mode = mode;
        }
        if let Some(url) = file.llm_url {
            self.llm_url = url;
        }
        if let Some(model) = file.llm_model {
            self.llm_model = model;
        }
        if let Some(command) = file.classifier_command {
            self.classifier_command = command;
        }
        if let Some(command) = file.probe_command {
            self.probe_command = Some(command);
        }
        if let Some(demucs) = file.demucs {
            self.demucs = demucs;
        }
        if let Some(folder) = file.waveform_folder {
            self.waveform_folder = Some(folder);
        }
        self
    }
}

/// Clamp a requested pool degree into [1, 8].
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Optional TOML config file shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    workers: Option<usize>,
    mode: Option<PhaseMode>,
    llm_url: Option<String>,
    llm_model: Option<String>,
    classifier_command: Option<Vec<String>>,
    probe_command: Option<Vec<String>>,
    demucs: Option<bool>,
    waveform_folder: Option<PathBuf>,
}
