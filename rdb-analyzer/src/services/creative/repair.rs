//! Tolerant JSON repair for LLM output
//!
//! Local models wrap JSON in code fences, use curly quotes, leave trailing
//! commas and bare keys. Parsing is attempted twice: raw first, then after
//! the repair pipeline below. Callers fall back to defaults when both fail.

use once_cell::sync::Lazy;
use regex::Regex;

static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("bare-key regex"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#",\s*([}\]])"#).expect("trailing-comma regex"));

/// Parse `raw` as JSON, repairing on a second attempt.
pub fn parse_lenient(raw: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }
    serde_json::from_str(&repair(raw)).ok()
}

/// The repair pipeline: strip code fences, straighten quotes, extract the
/// largest balanced `{…}` block, drop trailing commas, quote bare keys,
/// convert single-quoted strings, strip control characters.
pub fn repair(raw: &str) -> String {
    let mut text = strip_code_fences(raw);
    text = normalize_quotes(&text);
    if let Some(block) = largest_balanced_object(&text) {
        text = block;
    }
    text = convert_single_quotes(&text);
    text = BARE_KEY.replace_all(&text, "$1\"$2\":").to_string();
    text = TRAILING_COMMA.replace_all(&text, "$1").to_string();
    strip_control_chars(&text)
}

fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// Extract the largest brace-balanced `{…}` substring, tracking strings so
/// braces inside them don't count.
fn largest_balanced_object(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push(i),
            '}' => {
                if let Some(start) = stack.pop() {
                    let span = i - start;
                    if best.map(|(s, e)| e - s).unwrap_or(0) < span {
                        best = Some((start, i));
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(start, end)| chars[start..=end].iter().collect())
}

/// Convert single-quoted strings to double-quoted, preserving apostrophes
/// inside existing double-quoted strings.
fn convert_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                out.push(c);
                escaped = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            '\'' if !in_double => {
                // Heuristic: a quote beginning or ending a token is a string
                // delimiter; mid-word apostrophes stay.
                if in_single {
                    in_single = false;
                    out.push('"');
                } else if chars.peek().map(|n| *n != '\'').unwrap_or(false) {
                    in_single = true;
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
            '"' if in_single => {
                out.push('\\');
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_valid_json_passes_through() {
        let value = parse_lenient(r#"{"genre":["Rock"]}"#).expect("parses");
        assert_eq!(value["genre"][0], "Rock");
    }

    #[test]
    fn code_fences_are_stripped() {
        let raw = "```json\n{\"mood\": [\"Chill/Mellow\"]}\n```";
        let value = parse_lenient(raw).expect("parses");
        assert_eq!(value["mood"][0], "Chill/Mellow");
    }

    #[test]
    fn curly_quotes_and_trailing_commas_repair() {
        let raw = "{\u{201C}genre\u{201D}: [\u{201C}Funk\u{201D},],}";
        let value = parse_lenient(raw).expect("parses");
        assert_eq!(value["genre"][0], "Funk");
    }

    #[test]
    fn bare_keys_get_quoted() {
        let value = parse_lenient(r#"{genre: ["Rock"], confidence: 0.8}"#).expect("parses");
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn single_quoted_strings_convert() {
        let value = parse_lenient(r#"{'vocals': ['No Vocals']}"#).expect("parses");
        assert_eq!(value["vocals"][0], "No Vocals");
    }

    #[test]
    fn prose_around_object_is_discarded() {
        let raw = "Here is the analysis you asked for:\n{\"theme\": [\"Sports\"]}\nHope that helps!";
        let value = parse_lenient(raw).expect("parses");
        assert_eq!(value["theme"][0], "Sports");
    }

    #[test]
    fn control_characters_are_stripped() {
        let raw = "{\"narrative\": \"calm\u{0007} piece\"}";
        let value = parse_lenient(raw).expect("parses");
        assert_eq!(value["narrative"], "calm  piece");
    }

    #[test]
    fn hopeless_input_returns_none() {
        assert!(parse_lenient("no json here at all").is_none());
    }
}
