//! Local chat-completion client
//!
//! Talks to the locally hosted LLM server (Ollama wire shape). Every
//! failure degrades to default creative facts with a human-readable status
//! string; the creative phase never fails a track.

use super::normalize::normalize_response;
use super::repair::parse_lenient;
use crate::services::taxonomy;
use chrono::Utc;
use once_cell::sync::Lazy;
use rdb_common::model::CreativeFacts;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub const STATUS_OK: &str = "ok";
pub const STATUS_OFFLINE: &str = "Ollama offline - creative analysis skipped";
pub const STATUS_PARSE_ERROR: &str = "Creative response parse error - defaults used";

pub fn status_model_missing(model: &str) -> String {
    format!("Ollama model '{model}' not installed - creative analysis skipped")
}

/// Parameter-count suffix in a model name, e.g. `llama3:70b`.
static PARAM_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)b").expect("param-count regex"));

/// Creative phase result: facts plus the status string carried in the record.
#[derive(Debug, Clone)]
pub struct CreativeOutcome {
    pub facts: CreativeFacts,
    pub status: String,
}

impl CreativeOutcome {
    pub fn defaults(status: impl Into<String>) -> Self {
        Self {
            facts: CreativeFacts::default(),
            status: status.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// Chat-completion client for the creative phase.
pub struct CreativeClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    /// Unparseable responses are appended here for later inspection.
    diagnostic_log: Option<PathBuf>,
}

impl CreativeClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            diagnostic_log: None,
        }
    }

    pub fn with_diagnostic_log(mut self, path: PathBuf) -> Self {
        self.diagnostic_log = Some(path);
        self
    }

    /// Run the creative analysis for one track. Never fails.
    pub async fn analyze(
        &self,
        title: &str,
        bpm: Option<u32>,
        hints: &BTreeMap<String, bool>,
    ) -> CreativeOutcome {
        match self.check_model_available().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(model = %self.model, "Configured model missing from server listing");
                return CreativeOutcome::defaults(status_model_missing(&self.model));
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM server unreachable");
                return CreativeOutcome::defaults(STATUS_OFFLINE);
            }
        }

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": user_prompt(title, bpm, hints)},
            ],
            "stream": false,
            "format": "json",
            "options": {
                "temperature": temperature_for_model(&self.model),
                "top_p": 0.9,
            },
        });

        let response = match self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed");
                return CreativeOutcome::defaults(STATUS_OFFLINE);
            }
        };

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Chat response body unreadable");
                return CreativeOutcome::defaults(STATUS_PARSE_ERROR);
            }
        };

        let Some(content) = extract_content(&payload) else {
            self.log_parse_failure(title, &payload.to_string());
            return CreativeOutcome::defaults(STATUS_PARSE_ERROR);
        };

        match parse_lenient(&content) {
            Some(parsed) => CreativeOutcome {
                facts: normalize_response(&parsed),
                status: STATUS_OK.to_string(),
            },
            None => {
                self.log_parse_failure(title, &content);
                CreativeOutcome::defaults(STATUS_PARSE_ERROR)
            }
        }
    }

    /// Fail fast when the configured model is not in the server listing.
    async fn check_model_available(&self) -> Result<bool, reqwest::Error> {
        let listing: ModelListing = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .json()
            .await?;
        Ok(listing
            .models
            .iter()
            .any(|entry| model_matches(&entry.name, &self.model)))
    }

    fn log_parse_failure(&self, title: &str, content: &str) {
        tracing::warn!(title, "Creative response failed both parse attempts");
        let Some(path) = &self.diagnostic_log else {
            return;
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| {
                writeln!(
                    file,
                    "--- {} | {title}\n{content}\n",
                    Utc::now().to_rfc3339()
                )
            });
        if let Err(e) = result {
            tracing::debug!(error = %e, "Could not append to diagnostic log");
        }
    }
}

/// Temperature policy: bigger models run colder.
fn temperature_for_model(model: &str) -> f64 {
    let size = PARAM_COUNT
        .captures(&model.to_lowercase())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    match size {
        Some(params) if params >= 13.0 => 0.3,
        _ => 0.7,
    }
}

/// Listing entries like `llama3:8b` match a configured `llama3`.
fn model_matches(listed: &str, configured: &str) -> bool {
    listed == configured || listed.split(':').next() == Some(configured)
}

/// Content preference: `message.content`, then `response`, then `content`.
fn extract_content(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| payload.get("response").and_then(Value::as_str))
        .or_else(|| payload.get("content").and_then(Value::as_str))
        .map(|s| s.to_string())
}

fn system_prompt() -> String {
    format!(
        "You are a music supervisor tagging production music. Respond with a single JSON object \
         and nothing else, with exactly these fields: mood, genre, theme, instrument, vocals, \
         lyricThemes, narrative, confidence. Each list field uses only these values. \
         mood: {moods}. genre: {genres}. theme: {themes}. vocals: {vocals}. \
         instrument is a list of instrument names you hear. lyricThemes is a short list of \
         lyric topics, empty when there are no vocals. narrative is one or two sentences, \
         200 characters at most. confidence is a number between 0 and 1.",
        moods = taxonomy::MOODS.join(", "),
        genres = taxonomy::GENRES.join(", "),
        themes = taxonomy::THEMES.join(", "),
        vocals = taxonomy::VOCALS.join(", "),
    )
}

fn user_prompt(title: &str, bpm: Option<u32>, hints: &BTreeMap<String, bool>) -> String {
    let detected: Vec<&str> = hints
        .iter()
        .filter(|(_, present)| **present)
        .map(|(label, _)| label.as_str())
        .collect();
    let mut prompt = format!("Track title: {title}");
    if let Some(bpm) = bpm {
        prompt.push_str(&format!("\nTempo: {bpm} BPM"));
    }
    if !detected.is_empty() {
        prompt.push_str(&format!(
            "\nInstruments detected by audio probes: {}",
            detected.join(", ")
        ));
    }
    prompt.push_str("\nDescribe this track.");
    prompt
}
