//! Instrument finalization properties
//!
//! Covers canonicalization, family collapse, the Strings soft-guard and the
//! idempotence guarantee across representative inputs.

use rdb_analyzer::services::finalizer::{finalize, strip_section_suffix};

fn vecs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn alias_table_normalizes_known_variants() {
    let out = finalize(
        &vecs(&[
            "Drum set",
            "Electric organ",
            "Strings (section)",
            "Brass (section)",
            "Woodwind",
            "Guitars",
        ]),
        &[],
        &[],
    );
    // Section tokens lead in fixed order, then remaining labels first-seen.
    assert_eq!(
        out,
        vecs(&[
            "Brass",
            "Woodwinds",
            "Strings",
            "Drum Kit (acoustic)",
            "Organ",
            "Electric Guitar",
        ])
    );
}

#[test]
fn brass_family_closure() {
    for member in [
        "Trumpet",
        "Trombone",
        "French Horn",
        "Tuba",
        "Flugelhorn",
        "Cornet",
        "Trumpet (mute)",
        "Trumpet (muted)",
    ] {
        let out = finalize(&vecs(&[member, "Piano"]), &[], &[]);
        assert!(out.contains(&"Brass".to_string()), "{member} should collapse");
        assert!(!out.contains(&member.to_string()), "{member} should be removed");
    }
}

#[test]
fn woodwind_family_closure() {
    let out = finalize(&vecs(&["Saxophone", "Flute", "Clarinet", "Piano"]), &[], &[]);
    assert_eq!(out, vecs(&["Woodwinds", "Piano"]));
}

#[test]
fn single_string_member_is_not_collapsed() {
    let out = finalize(&vecs(&["Trumpet", "Trombone", "Violin"]), &[], &[]);
    assert_eq!(out, vecs(&["Brass", "Violin"]));
}

#[test]
fn multiple_string_members_collapse() {
    let out = finalize(&vecs(&["Violin", "Viola", "Cello", "Double Bass", "Harp"]), &[], &[]);
    assert_eq!(out, vecs(&["Strings"]));
}

#[test]
fn strings_soft_guard_removes_padlike_section() {
    assert_eq!(finalize(&vecs(&["Strings", "Organ"]), &[], &[]), vecs(&["Organ"]));
    assert_eq!(
        finalize(&vecs(&["Strings", "Keyboard"]), &[], &[]),
        vecs(&["Keyboard"])
    );
    assert_eq!(
        finalize(&vecs(&["Strings", "Synth"]), &[], &[]),
        vecs(&["Synth"])
    );
}

#[test]
fn strings_soft_guard_keeps_anchored_section() {
    assert_eq!(
        finalize(&vecs(&["Strings", "Organ", "Brass"]), &[], &[]),
        vecs(&["Brass", "Strings", "Organ"])
    );
}

#[test]
fn strings_without_padlike_company_survive() {
    assert_eq!(
        finalize(&vecs(&["Strings", "Piano"]), &[], &[]),
        vecs(&["Strings", "Piano"])
    );
}

#[test]
fn sources_merge_in_fixed_order() {
    let out = finalize(
        &vecs(&["Piano"]),
        &vecs(&["Electric Guitar"]),
        &vecs(&["Bass Guitar", "Piano"]),
    );
    assert_eq!(out, vecs(&["Piano", "Electric Guitar", "Bass Guitar"]));
}

#[test]
fn finalization_is_idempotent() {
    let cases: Vec<(Vec<String>, Vec<String>, Vec<String>)> = vec![
        (vecs(&["Trumpet", "Trombone", "Violin"]), vec![], vec![]),
        (vecs(&["Strings", "Organ"]), vec![], vec![]),
        (vecs(&["Strings", "Organ", "Brass"]), vec![], vec![]),
        (
            vecs(&["Drums", "Guitars"]),
            vecs(&["Piano"]),
            vecs(&["Saxophone", "Flute"]),
        ),
        (vec![], vec![], vec![]),
    ];
    for (ensemble, rescues, additional) in cases {
        let first = finalize(&ensemble, &rescues, &additional);
        let second = finalize(&first, &[], &[]);
        assert_eq!(first, second, "not idempotent for {ensemble:?}");
    }
}

#[test]
fn empty_input_produces_empty_output() {
    assert!(finalize(&[], &[], &[]).is_empty());
}

#[test]
fn display_strip_only_touches_suffix() {
    assert_eq!(strip_section_suffix("Strings (section)"), "Strings");
    assert_eq!(strip_section_suffix("Trumpet (muted)"), "Trumpet (muted)");
}
