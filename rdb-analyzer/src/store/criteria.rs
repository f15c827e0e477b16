//! Criteria store construction
//!
//! Full sweep of the main store into sorted, deduplicated facet value
//! sets. A pure function of the store snapshot, so two successive rebuilds
//! without intervening upserts are byte-identical.

use crate::services::finalizer::strip_section_suffix;
use crate::services::taxonomy::tempo_band;
use rdb_common::model::{CriteriaStore, MainStore};

/// Build the facet sets from a main-store snapshot.
pub fn build_criteria(store: &MainStore) -> CriteriaStore {
    let mut genre = Vec::new();
    let mut mood = Vec::new();
    let mut instrument = Vec::new();
    let mut vocals = Vec::new();
    let mut theme = Vec::new();
    let mut tempo_bands = Vec::new();
    let mut keys = Vec::new();
    let mut artists = Vec::new();
    let mut electronic_elements = Vec::new();

    for record in store.tracks.values() {
        genre.extend(record.creative.genre.iter().cloned());
        mood.extend(record.creative.mood.iter().cloned());
        vocals.extend(record.creative.vocals.iter().cloned());
        theme.extend(record.creative.theme.iter().cloned());

        instrument.extend(
            record
                .resolved_instruments()
                .iter()
                .map(|label| strip_section_suffix(label).to_string()),
        );

        if let Some(bpm) = record.technical.bpm {
            tempo_bands.push(tempo_band(bpm).to_string());
        }
        if let Some(key) = &record.technical.tags.key {
            if !key.trim().is_empty() {
                keys.push(key.trim().to_string());
            }
        }
        if let Some(artist) = &record.technical.tags.artist {
            if !artist.trim().is_empty() {
                artists.push(artist.trim().to_string());
            }
        }
        if let Some(ee) = &record.analysis.electronic_elements {
            electronic_elements.push(if ee.detected { "Yes" } else { "No" }.to_string());
        }
    }

    CriteriaStore {
        genre: facet(genre),
        mood: facet(mood),
        instrument: facet(instrument),
        vocals: facet(vocals),
        theme: facet(theme),
        tempo_bands: facet(tempo_bands),
        keys: facet(keys),
        artists: facet(artists),
        electronic_elements: facet(electronic_elements),
    }
}

/// Case-insensitive sort and dedup; the first-seen spelling survives.
fn facet(mut values: Vec<String>) -> Vec<String> {
    values.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    values.dedup_by(|a, b| a.to_lowercase() == b.to_lowercase());
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::model::{ElectronicElements, TrackRecord};

    #[test]
    fn facets_sort_and_dedup_case_insensitively() {
        assert_eq!(
            facet(vec!["rock".into(), "Funk".into(), "Rock".into()]),
            vec!["Funk".to_string(), "rock".to_string()]
        );
    }

    #[test]
    fn instrument_facet_strips_section_suffix() {
        let mut record = TrackRecord::default();
        record.key = "k".into();
        record.analysis.final_instruments =
            vec!["Brass (section)".into(), "Piano".into()];
        let mut store = MainStore::default();
        store.tracks.insert(record.key.clone(), record);

        let criteria = build_criteria(&store);
        assert_eq!(criteria.instrument, ["Brass".to_string(), "Piano".to_string()]);
    }

    #[test]
    fn electronic_facet_uses_yes_no() {
        let mut yes = TrackRecord::default();
        yes.key = "a".into();
        yes.analysis.electronic_elements = Some(ElectronicElements {
            detected: true,
            ..ElectronicElements::default()
        });
        let mut no = TrackRecord::default();
        no.key = "b".into();
        no.analysis.electronic_elements = Some(ElectronicElements::default());
        let mut absent = TrackRecord::default();
        absent.key = "c".into();

        let mut store = MainStore::default();
        for record in [yes, no, absent] {
            store.tracks.insert(record.key.clone(), record);
        }
        let criteria = build_criteria(&store);
        assert_eq!(criteria.electronic_elements, ["No".to_string(), "Yes".to_string()]);
    }

    #[test]
    fn rebuild_is_pure_in_the_snapshot() {
        let mut record = TrackRecord::default();
        record.key = "k".into();
        record.creative.genre = vec!["Rock".into()];
        record.technical.bpm = Some(90);
        let mut store = MainStore::default();
        store.tracks.insert(record.key.clone(), record);

        let first = build_criteria(&store);
        let second = build_criteria(&store);
        assert_eq!(first, second);
        assert_eq!(first.tempo_bands, ["Medium (90-110 BPM)".to_string()]);
    }
}
