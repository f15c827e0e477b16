//! Instrument finalization
//!
//! Pure function producing the single canonical instrument list from the
//! three ordered sources (ensemble output, probe rescues, additional labels).
//! Canonicalizes aliases, collapses family members into section tokens,
//! applies the Strings soft-guard and assembles the final ordering with
//! family tokens leading.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Common label variants → canonical tokens.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("drum set", "Drum Kit (acoustic)"),
        ("drums", "Drum Kit (acoustic)"),
        ("electric organ", "Organ"),
        ("hammond organ", "Organ"),
        ("strings (section)", "Strings"),
        ("brass (section)", "Brass"),
        ("woodwinds (section)", "Woodwinds"),
        ("woodwind", "Woodwinds"),
        ("guitars", "Electric Guitar"),
    ])
});

const BRASS_MEMBERS: &[&str] = &[
    "Trumpet",
    "Trombone",
    "French Horn",
    "Tuba",
    "Flugelhorn",
    "Cornet",
    "Trumpet (mute)",
    "Trumpet (muted)",
];

const WOODWIND_MEMBERS: &[&str] = &[
    "Saxophone",
    "Alto Saxophone",
    "Tenor Saxophone",
    "Baritone Saxophone",
    "Flute",
    "Clarinet",
    "Oboe",
    "Bassoon",
    "Piccolo",
];

const STRING_MEMBERS: &[&str] = &["Violin", "Viola", "Cello", "Double Bass", "Harp"];

/// Pad-like instruments that can masquerade as a string section.
const PAD_LIKE: &[&str] = &["Organ", "Keyboard", "Synth"];

fn is_member(label: &str, members: &[&str]) -> bool {
    members.iter().any(|m| m.eq_ignore_ascii_case(label))
}

fn canonicalize(label: &str) -> String {
    let trimmed = label.trim();
    match ALIASES.get(trimmed.to_lowercase().as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => trimmed.to_string(),
    }
}

/// Remove a trailing `" (section)"` suffix for facet display.
pub fn strip_section_suffix(label: &str) -> &str {
    label.strip_suffix(" (section)").unwrap_or(label)
}

/// Produce the canonical, ordered, deduplicated instrument list.
///
/// Sources are walked in the fixed order ensemble → probe rescues →
/// additional; within that concatenation the first occurrence of a label
/// wins. Section tokens (`Brass`, `Woodwinds`, `Strings`), whether present
/// in the input or synthesized by family collapse, lead the output in that
/// fixed order.
///
/// Family collapse: any brass or woodwind member present pulls the whole
/// family into its section token. String members collapse only when two or
/// more are present (a lone bowed instrument is kept as itself).
///
/// Strings soft-guard: a `Strings` token with no bowed member anywhere in
/// the input, pad-like company (`Organ`/`Keyboard`/`Synth`) and no `Brass`
/// orchestral anchor is treated as a synth-pad misread and dropped.
pub fn finalize(ensemble: &[String], probe_rescues: &[String], additional: &[String]) -> Vec<String> {
    // Alias-normalize and stable-dedup across the concatenated sources.
    let mut labels: Vec<String> = Vec::new();
    for label in ensemble.iter().chain(probe_rescues).chain(additional) {
        let canonical = canonicalize(label);
        if canonical.is_empty() {
            continue;
        }
        if !labels.iter().any(|seen| seen.eq_ignore_ascii_case(&canonical)) {
            labels.push(canonical);
        }
    }

    let had_bowed_input = labels.iter().any(|l| is_member(l, STRING_MEMBERS));
    let string_member_count = labels.iter().filter(|l| is_member(l, STRING_MEMBERS)).count();

    // Family collapse.
    let mut brass = labels.iter().any(|l| l.eq_ignore_ascii_case("Brass"));
    if labels.iter().any(|l| is_member(l, BRASS_MEMBERS)) {
        brass = true;
    }
    let mut woodwinds = labels.iter().any(|l| l.eq_ignore_ascii_case("Woodwinds"));
    if labels.iter().any(|l| is_member(l, WOODWIND_MEMBERS)) {
        woodwinds = true;
    }
    let mut strings = labels.iter().any(|l| l.eq_ignore_ascii_case("Strings"));
    let collapse_strings = strings || string_member_count >= 2;
    if collapse_strings && string_member_count > 0 {
        strings = true;
    }

    labels.retain(|l| {
        !is_member(l, BRASS_MEMBERS)
            && !is_member(l, WOODWIND_MEMBERS)
            && !(collapse_strings && is_member(l, STRING_MEMBERS))
            && !l.eq_ignore_ascii_case("Brass")
            && !l.eq_ignore_ascii_case("Woodwinds")
            && !l.eq_ignore_ascii_case("Strings")
    });

    // Strings soft-guard: pad-like company, no bowed evidence, no anchor.
    if strings
        && !had_bowed_input
        && labels.iter().any(|l| is_member(l, PAD_LIKE))
        && !brass
    {
        strings = false;
    }

    let mut out = Vec::with_capacity(labels.len() + 3);
    if brass {
        out.push("Brass".to_string());
    }
    if woodwinds {
        out.push("Woodwinds".to_string());
    }
    if strings {
        out.push("Strings".to_string());
    }
    out.extend(labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vecs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aliases_normalize() {
        let out = finalize(&vecs(&["Drums", "Guitars", "Hammond organ"]), &[], &[]);
        assert_eq!(
            out,
            vecs(&["Drum Kit (acoustic)", "Electric Guitar", "Organ"])
        );
    }

    #[test]
    fn dedup_is_stable_and_case_insensitive() {
        let out = finalize(
            &vecs(&["Piano", "piano"]),
            &vecs(&["Piano", "Bass Guitar"]),
            &[],
        );
        assert_eq!(out, vecs(&["Piano", "Bass Guitar"]));
    }

    #[test]
    fn lone_bowed_member_survives() {
        let out = finalize(&vecs(&["Trumpet", "Trombone", "Violin"]), &[], &[]);
        assert_eq!(out, vecs(&["Brass", "Violin"]));
    }

    #[test]
    fn two_bowed_members_collapse() {
        let out = finalize(&vecs(&["Violin", "Cello", "Piano"]), &[], &[]);
        assert_eq!(out, vecs(&["Strings", "Piano"]));
    }

    #[test]
    fn soft_guard_drops_padlike_strings() {
        let out = finalize(&vecs(&["Strings", "Organ"]), &[], &[]);
        assert_eq!(out, vecs(&["Organ"]));
    }

    #[test]
    fn soft_guard_respects_brass_anchor() {
        let out = finalize(&vecs(&["Strings", "Organ", "Brass"]), &[], &[]);
        assert_eq!(out, vecs(&["Brass", "Strings", "Organ"]));
    }

    #[test]
    fn idempotent() {
        let first = finalize(
            &vecs(&["Trumpet", "Violin", "Cello", "Piano"]),
            &vecs(&["Electric Guitar"]),
            &[],
        );
        let second = finalize(&first, &[], &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn section_suffix_strips_for_display() {
        assert_eq!(strip_section_suffix("Brass (section)"), "Brass");
        assert_eq!(strip_section_suffix("Piano"), "Piano");
    }
}
