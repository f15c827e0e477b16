//! Creative response normalization
//!
//! Maps the model's free-form JSON onto [`CreativeFacts`] constrained to the
//! closed taxonomies. Instruments and vocals go through their own synonym
//! tables; the instrument list here is advisory only and never reaches
//! `analysis.instruments`.

use crate::services::taxonomy;
use rdb_common::model::CreativeFacts;
use serde_json::Value;

/// Cap on creative instrument suggestions.
const MAX_SUGGESTED_INSTRUMENTS: usize = 8;

/// Cap on the narrative length.
const MAX_NARRATIVE_CHARS: usize = 200;

const NO_VOCALS: &str = "No Vocals";

/// Normalize a parsed creative response into facts.
pub fn normalize_response(value: &Value) -> CreativeFacts {
    let mut facts = CreativeFacts::default();

    facts.genre = mapped_list(value, "genre", taxonomy::GENRES);
    facts.mood = mapped_list(value, "mood", taxonomy::MOODS);
    facts.theme = mapped_list(value, "theme", taxonomy::THEMES);
    facts.lyric_themes = string_list(value, "lyricThemes");

    facts.suggested_instruments = string_list(value, "instrument")
        .iter()
        .filter_map(|raw| taxonomy::canonical_instrument(raw))
        .map(|s| s.to_string())
        .fold(Vec::new(), |mut acc, label| {
            if !acc.contains(&label) {
                acc.push(label);
            }
            acc
        });
    facts.suggested_instruments.truncate(MAX_SUGGESTED_INSTRUMENTS);

    facts.vocals = normalize_vocals(&string_list(value, "vocals"));
    if facts.vocals == [NO_VOCALS.to_string()] {
        facts.lyric_themes.clear();
    }

    facts.narrative = value
        .get("narrative")
        .and_then(Value::as_str)
        .map(truncate_narrative)
        .unwrap_or_default();

    facts.confidence = parse_confidence(value.get("confidence"));
    facts
}

/// Vocals list with the hard default: empty, or any entry failing to map,
/// collapses the whole list to `["No Vocals"]`.
fn normalize_vocals(raw: &[String]) -> Vec<String> {
    if raw.is_empty() {
        return vec![NO_VOCALS.to_string()];
    }
    let mut mapped = Vec::new();
    for entry in raw {
        match taxonomy::canonical_vocals(entry) {
            Some(canonical) => {
                let canonical = canonical.to_string();
                if !mapped.contains(&canonical) {
                    mapped.push(canonical);
                }
            }
            None => return vec![NO_VOCALS.to_string()],
        }
    }
    if mapped.is_empty() {
        return vec![NO_VOCALS.to_string()];
    }
    mapped
}

/// Parse confidence as a number (halved when > 1) or a percent string,
/// coerced into [0, 1].
fn parse_confidence(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64().map(|v| if v > 1.0 { v / 2.0 } else { v }),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if let Some(percent) = trimmed.strip_suffix('%') {
                percent.trim().parse::<f64>().ok().map(|v| v / 100.0)
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .map(|v| if v > 1.0 { v / 2.0 } else { v })
            }
        }
        _ => None,
    };
    parsed.unwrap_or(0.0).clamp(0.0, 1.0)
}

fn truncate_narrative(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_NARRATIVE_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_NARRATIVE_CHARS).collect()
}

fn string_list(value: &Value, field: &str) -> Vec<String> {
    match value.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        // Tolerate a single string where a list was asked for.
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn mapped_list(value: &Value, field: &str, list: &'static [&'static str]) -> Vec<String> {
    string_list(value, field)
        .iter()
        .filter_map(|raw| taxonomy::match_taxonomy(raw, list))
        .map(|s| s.to_string())
        .fold(Vec::new(), |mut acc, label| {
            if !acc.contains(&label) {
                acc.push(label);
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn taxonomy_lists_filter_unknowns() {
        let facts = normalize_response(&json!({
            "genre": ["rock", "polka", "Hip Hop"],
            "mood": ["energetic"],
            "vocals": ["none"]
        }));
        assert_eq!(facts.genre, ["Rock", "Hip hop/Rap"]);
        assert_eq!(facts.mood, ["Upbeat/Energetic"]);
    }

    #[test]
    fn unmappable_vocal_entry_resets_list() {
        let facts = normalize_response(&json!({
            "vocals": ["female singer", "growling"]
        }));
        assert_eq!(facts.vocals, ["No Vocals"]);
    }

    #[test]
    fn no_vocals_clears_lyric_themes() {
        let facts = normalize_response(&json!({
            "vocals": ["instrumental"],
            "lyricThemes": ["love", "loss"]
        }));
        assert_eq!(facts.vocals, ["No Vocals"]);
        assert!(facts.lyric_themes.is_empty());
    }

    #[test]
    fn vocal_entries_map_and_dedup() {
        let facts = normalize_response(&json!({
            "vocals": ["female", "Female Vocals", "backing vocals"],
            "lyricThemes": ["hope"]
        }));
        assert_eq!(facts.vocals, ["Female Vocals", "Background Vocals"]);
        assert_eq!(facts.lyric_themes, ["hope"]);
    }

    #[test]
    fn instruments_cap_at_eight() {
        let facts = normalize_response(&json!({
            "instrument": [
                "piano", "drums", "bass", "guitar", "organ", "sax",
                "flute", "violin", "cello", "trumpet"
            ],
            "vocals": ["none"]
        }));
        assert_eq!(facts.suggested_instruments.len(), 8);
        assert_eq!(facts.suggested_instruments[0], "Piano");
    }

    #[test]
    fn confidence_number_and_percent_forms() {
        let number = normalize_response(&json!({"confidence": 0.8, "vocals": ["none"]}));
        assert!((number.confidence - 0.8).abs() < 1e-9);

        let large = normalize_response(&json!({"confidence": 1.6, "vocals": ["none"]}));
        assert!((large.confidence - 0.8).abs() < 1e-9);

        let percent = normalize_response(&json!({"confidence": "85%", "vocals": ["none"]}));
        assert!((percent.confidence - 0.85).abs() < 1e-9);

        let absent = normalize_response(&json!({"vocals": ["none"]}));
        assert_eq!(absent.confidence, 0.0);
    }

    #[test]
    fn narrative_truncates_to_two_hundred_chars() {
        let long = "x".repeat(400);
        let facts = normalize_response(&json!({"narrative": long, "vocals": ["none"]}));
        assert_eq!(facts.narrative.chars().count(), 200);
    }
}
