//! Closed taxonomies and synonym tables
//!
//! The creative model and the classifiers both emit free-form strings; every
//! list that reaches a store is constrained to the fixed vocabularies below.
//! Instruments and vocals use separate synonym tables.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const MOODS: &[&str] = &[
    "Upbeat/Energetic",
    "Happy/Cheerful",
    "Inspiring/Uplifting",
    "Epic/Powerful",
    "Dramatic/Emotional",
    "Chill/Mellow",
    "Funny/Quirky",
    "Angry/Aggressive",
];

pub const GENRES: &[&str] = &[
    "Cinematic",
    "Corporate",
    "Hip hop/Rap",
    "Rock",
    "Electronic",
    "Ambient",
    "Funk",
    "Classical",
];

pub const THEMES: &[&str] = &[
    "Corporate",
    "Documentary",
    "Action",
    "Lifestyle",
    "Sports",
    "Drama",
    "Nature",
    "Technology",
];

pub const VOCALS: &[&str] = &[
    "No Vocals",
    "Background Vocals",
    "Female Vocals",
    "Lead Vocals",
    "Vocal Samples",
    "Male Vocals",
];

/// Genres whose presence elevates a low-confidence electronic-elements
/// verdict to medium during the merge.
pub const ELECTRONIC_GENRES: &[&str] = &["Electronic", "Hip hop/Rap"];

/// Canonical instrument vocabulary.
///
/// Family tokens (`Brass`, `Woodwinds`, `Strings`) are produced by
/// finalization but valid everywhere.
pub const INSTRUMENT_CANON: &[&str] = &[
    // Keyboards
    "Piano",
    "Electric Piano",
    "Rhodes",
    "Organ",
    "Harpsichord",
    "Clavinet",
    "Keyboard",
    "Synth",
    "Synth Bass",
    "Synth Lead",
    "Synth Pad",
    "Accordion",
    "Celesta",
    "Mellotron",
    // Guitars
    "Acoustic Guitar",
    "Electric Guitar",
    "Classical Guitar",
    "Twelve-String Guitar",
    "Slide Guitar",
    "Pedal Steel Guitar",
    "Lap Steel Guitar",
    "Resonator Guitar",
    "Banjo",
    "Mandolin",
    "Ukulele",
    // Bass
    "Bass Guitar",
    "Upright Bass",
    "Fretless Bass",
    // Drums & percussion
    "Drum Kit (acoustic)",
    "Drum Machine",
    "Electronic Drums",
    "Percussion",
    "Congas",
    "Bongos",
    "Timbales",
    "Tabla",
    "Djembe",
    "Cajon",
    "Shaker",
    "Tambourine",
    "Cowbell",
    "Claps",
    "Triangle",
    "Woodblock",
    "Timpani",
    "Taiko",
    // Mallets & bells
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Glockenspiel",
    "Steel Drums",
    "Kalimba",
    "Bells",
    "Tubular Bells",
    "Chimes",
    // Bowed & plucked strings
    "Violin",
    "Viola",
    "Cello",
    "Double Bass",
    "Harp",
    "Fiddle",
    "Sitar",
    "Koto",
    "Erhu",
    "Zither",
    "Dulcimer",
    "Oud",
    "Bouzouki",
    "Balalaika",
    "Charango",
    "Shamisen",
    // Brass
    "Trumpet",
    "Trombone",
    "French Horn",
    "Tuba",
    "Flugelhorn",
    "Cornet",
    "Trumpet (mute)",
    "Trumpet (muted)",
    // Woodwinds
    "Saxophone",
    "Alto Saxophone",
    "Tenor Saxophone",
    "Baritone Saxophone",
    "Soprano Saxophone",
    "Flute",
    "Clarinet",
    "Oboe",
    "Bassoon",
    "Piccolo",
    "Recorder",
    "Pan Flute",
    "Harmonica",
    "Bagpipes",
    "Whistle",
    "Ocarina",
    "Didgeridoo",
    // Electronic production
    "Sampler",
    "Sequencer",
    "Turntables",
    "Vocoder",
    "Theremin",
    "808 Bass",
    "Sub Bass",
    "Arpeggiator",
    // World percussion & misc
    "Mbira",
    "Hang Drum",
    "Bodhran",
    "Castanets",
    "Maracas",
    "Guiro",
    "Claves",
    "Agogo",
    "Cuica",
    "Berimbau",
    "Choir",
    "Whistling",
    "Beatboxing",
    // Family/section tokens
    "Brass",
    "Woodwinds",
    "Strings",
    "Brass (section)",
    "Woodwinds (section)",
    "Strings (section)",
];

/// Free-form instrument string → canonical token (creative suggestions only).
static INSTRUMENT_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("drums", "Drum Kit (acoustic)"),
        ("drum set", "Drum Kit (acoustic)"),
        ("drum kit", "Drum Kit (acoustic)"),
        ("drumkit", "Drum Kit (acoustic)"),
        ("acoustic drums", "Drum Kit (acoustic)"),
        ("live drums", "Drum Kit (acoustic)"),
        ("programmed drums", "Drum Machine"),
        ("drum programming", "Drum Machine"),
        ("beats", "Drum Machine"),
        ("808", "808 Bass"),
        ("808s", "808 Bass"),
        ("guitar", "Electric Guitar"),
        ("guitars", "Electric Guitar"),
        ("lead guitar", "Electric Guitar"),
        ("rhythm guitar", "Electric Guitar"),
        ("e-guitar", "Electric Guitar"),
        ("distorted guitar", "Electric Guitar"),
        ("acoustic", "Acoustic Guitar"),
        ("nylon guitar", "Classical Guitar"),
        ("bass", "Bass Guitar"),
        ("electric bass", "Bass Guitar"),
        ("upright", "Upright Bass"),
        ("contrabass", "Double Bass"),
        ("keys", "Keyboard"),
        ("keyboards", "Keyboard"),
        ("synthesizer", "Synth"),
        ("synthesizers", "Synth"),
        ("synths", "Synth"),
        ("synth pad", "Synth Pad"),
        ("pads", "Synth Pad"),
        ("pad", "Synth Pad"),
        ("electric organ", "Organ"),
        ("hammond organ", "Organ"),
        ("hammond", "Organ"),
        ("grand piano", "Piano"),
        ("electric piano", "Electric Piano"),
        ("rhodes piano", "Rhodes"),
        ("sax", "Saxophone"),
        ("alto sax", "Alto Saxophone"),
        ("tenor sax", "Tenor Saxophone"),
        ("bari sax", "Baritone Saxophone"),
        ("horns", "Brass"),
        ("horn section", "Brass"),
        ("brass section", "Brass"),
        ("string section", "Strings"),
        ("strings section", "Strings"),
        ("orchestral strings", "Strings"),
        ("woodwind", "Woodwinds"),
        ("winds", "Woodwinds"),
        ("wind section", "Woodwinds"),
        ("percussions", "Percussion"),
        ("hand percussion", "Percussion"),
        ("shakers", "Shaker"),
        ("hand claps", "Claps"),
        ("handclaps", "Claps"),
        ("scratching", "Turntables"),
        ("dj scratches", "Turntables"),
        ("vibes", "Vibraphone"),
        ("glock", "Glockenspiel"),
        ("steel pan", "Steel Drums"),
        ("steelpan", "Steel Drums"),
    ])
});

/// Free-form vocal string → canonical vocal token.
static VOCAL_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("none", "No Vocals"),
        ("no vocal", "No Vocals"),
        ("instrumental", "No Vocals"),
        ("no singing", "No Vocals"),
        ("female", "Female Vocals"),
        ("female vocal", "Female Vocals"),
        ("female singer", "Female Vocals"),
        ("female voice", "Female Vocals"),
        ("woman", "Female Vocals"),
        ("male", "Male Vocals"),
        ("male vocal", "Male Vocals"),
        ("male singer", "Male Vocals"),
        ("male voice", "Male Vocals"),
        ("man", "Male Vocals"),
        ("lead", "Lead Vocals"),
        ("lead vocal", "Lead Vocals"),
        ("lead singer", "Lead Vocals"),
        ("vocal", "Lead Vocals"),
        ("vocals", "Lead Vocals"),
        ("singing", "Lead Vocals"),
        ("sung", "Lead Vocals"),
        ("background", "Background Vocals"),
        ("backing", "Background Vocals"),
        ("backing vocals", "Background Vocals"),
        ("background vocal", "Background Vocals"),
        ("harmonies", "Background Vocals"),
        ("harmony vocals", "Background Vocals"),
        ("choir", "Background Vocals"),
        ("samples", "Vocal Samples"),
        ("vocal sample", "Vocal Samples"),
        ("vocal chops", "Vocal Samples"),
        ("sampled vocals", "Vocal Samples"),
        ("chops", "Vocal Samples"),
    ])
});

/// Match a free-form value against a closed list, case-insensitively.
///
/// Compound entries like `"Hip hop/Rap"` also match on either slash part,
/// so `"rap"` maps to `"Hip hop/Rap"`.
pub fn match_taxonomy(value: &str, list: &'static [&'static str]) -> Option<&'static str> {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    for entry in list {
        if entry.to_lowercase() == needle {
            return Some(entry);
        }
    }
    for entry in list {
        if entry
            .split('/')
            .any(|part| part.trim().to_lowercase() == needle)
        {
            return Some(entry);
        }
    }
    None
}

/// Map a free-form instrument string onto the canonical vocabulary.
pub fn canonical_instrument(raw: &str) -> Option<&'static str> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(mapped) = INSTRUMENT_SYNONYMS.get(needle.as_str()) {
        return Some(mapped);
    }
    INSTRUMENT_CANON
        .iter()
        .find(|canon| canon.to_lowercase() == needle)
        .copied()
}

/// Map a free-form vocal string onto the canonical vocal vocabulary.
pub fn canonical_vocals(raw: &str) -> Option<&'static str> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(mapped) = VOCAL_SYNONYMS.get(needle.as_str()) {
        return Some(mapped);
    }
    VOCALS
        .iter()
        .find(|canon| canon.to_lowercase() == needle)
        .copied()
}

/// Fixed tempo band labels. Lower bound inclusive, upper exclusive.
pub fn tempo_band(bpm: u32) -> &'static str {
    match bpm {
        0..=59 => "Very Slow (Below 60 BPM)",
        60..=89 => "Slow (60-90 BPM)",
        90..=109 => "Medium (90-110 BPM)",
        110..=139 => "Upbeat (110-140 BPM)",
        140..=159 => "Fast (140-160 BPM)",
        _ => "Very Fast (160+ BPM)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_band_boundaries() {
        assert_eq!(tempo_band(59), "Very Slow (Below 60 BPM)");
        assert_eq!(tempo_band(60), "Slow (60-90 BPM)");
        assert_eq!(tempo_band(90), "Medium (90-110 BPM)");
        assert_eq!(tempo_band(110), "Upbeat (110-140 BPM)");
        assert_eq!(tempo_band(140), "Fast (140-160 BPM)");
        assert_eq!(tempo_band(160), "Very Fast (160+ BPM)");
        assert_eq!(tempo_band(220), "Very Fast (160+ BPM)");
    }

    #[test]
    fn taxonomy_matches_compound_parts() {
        assert_eq!(match_taxonomy("rap", GENRES), Some("Hip hop/Rap"));
        assert_eq!(match_taxonomy("HIP HOP", GENRES), Some("Hip hop/Rap"));
        assert_eq!(match_taxonomy("energetic", MOODS), Some("Upbeat/Energetic"));
        assert_eq!(match_taxonomy("polka", GENRES), None);
    }

    #[test]
    fn instrument_synonyms_resolve() {
        assert_eq!(canonical_instrument("Drums"), Some("Drum Kit (acoustic)"));
        assert_eq!(canonical_instrument("guitars"), Some("Electric Guitar"));
        assert_eq!(canonical_instrument("Hammond"), Some("Organ"));
        assert_eq!(canonical_instrument("piano"), Some("Piano"));
        assert_eq!(canonical_instrument("kazoo ensemble"), None);
    }

    #[test]
    fn vocal_synonyms_resolve() {
        assert_eq!(canonical_vocals("instrumental"), Some("No Vocals"));
        assert_eq!(canonical_vocals("female singer"), Some("Female Vocals"));
        assert_eq!(canonical_vocals("Lead Vocals"), Some("Lead Vocals"));
        assert_eq!(canonical_vocals("growling"), None);
    }
}
