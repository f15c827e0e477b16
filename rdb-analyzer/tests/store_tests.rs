//! Library store behavior
//!
//! Upsert merge semantics, key collapsing across path spellings, criteria
//! rebuild purity, and the no-partial-file write guarantee.

use rdb_analyzer::store::{LibraryStore, CRITERIA_STORE_FILE, MAIN_STORE_FILE};
use rdb_common::keys::track_key;
use rdb_common::model::{ElectronicElements, TrackRecord};

fn record_for(path: &str) -> TrackRecord {
    let mut record = TrackRecord::default();
    record.key = track_key(path);
    record.path = path.to_string();
    record.file = path.rsplit('/').next().unwrap_or(path).to_string();
    record.analyzed_at = chrono::Utc::now();
    record
}

#[tokio::test]
async fn upsert_collapses_paths_differing_in_case_and_separators() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    let mut first = record_for("/Music/Song.mp3");
    first.technical.bpm = Some(120);
    let persisted_first = store.upsert(&first).await.expect("first upsert");

    let mut second = record_for(r"\music\Song.MP3");
    second.key = track_key(r"\music\Song.MP3");
    second.creative.genre = vec!["Rock".to_string()];
    let persisted_second = store.upsert(&second).await.expect("second upsert");

    let main = store.load_main().await.expect("load");
    assert_eq!(main.tracks.len(), 1, "both spellings map to one entry");

    // created_at survives the second write; updated_at moves.
    assert_eq!(persisted_second.created_at, persisted_first.created_at);
    assert!(persisted_second.updated_at >= persisted_first.updated_at);
    // Merged record keeps facts from both writes.
    assert_eq!(persisted_second.technical.bpm, Some(120));
    assert_eq!(persisted_second.creative.genre, ["Rock".to_string()]);
}

#[tokio::test]
async fn upsert_unions_creative_lists_and_overwrites_scalars() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    let mut first = record_for("/m/track.mp3");
    first.creative.mood = vec!["Chill/Mellow".to_string()];
    first.creative.vocals = vec!["No Vocals".to_string()];
    first.creative.narrative = "first pass".to_string();
    store.upsert(&first).await.expect("first");

    let mut second = record_for("/m/track.mp3");
    second.creative.mood = vec!["Epic/Powerful".to_string(), "Chill/Mellow".to_string()];
    second.creative.vocals = vec!["Female Vocals".to_string()];
    second.creative.narrative = "second pass".to_string();
    let merged = store.upsert(&second).await.expect("second");

    assert_eq!(
        merged.creative.mood,
        ["Chill/Mellow".to_string(), "Epic/Powerful".to_string()],
        "existing order first, new entries appended"
    );
    assert_eq!(
        merged.creative.vocals,
        ["No Vocals".to_string(), "Female Vocals".to_string()]
    );
    assert_eq!(merged.creative.narrative, "second pass");
}

#[tokio::test]
async fn instrument_precedence_feeds_creative_instrument_and_facet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    let mut record = record_for("/m/horns.mp3");
    record.creative.suggested_instruments = vec!["Piano".to_string()];
    record.analysis.instruments = vec!["Brass (section)".to_string()];
    record.analysis.final_instruments = vec!["Brass (section)".to_string(), "Organ".to_string()];
    store.upsert(&record).await.expect("upsert");

    let main = store.load_main().await.expect("load");
    let persisted = main.tracks.values().next().expect("one record");
    assert_eq!(
        persisted.creative.instrument,
        ["Brass (section)".to_string(), "Organ".to_string()],
        "analysis.final_instruments wins the precedence"
    );

    let criteria = store.rebuild_criteria().await.expect("rebuild");
    assert_eq!(
        criteria.instrument,
        ["Brass".to_string(), "Organ".to_string()],
        "facet strips the section suffix"
    );
}

#[tokio::test]
async fn criteria_rebuild_is_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    for (path, bpm, genre) in [
        ("/m/a.mp3", Some(92), "Rock"),
        ("/m/b.mp3", Some(160), "Electronic"),
        ("/m/c.mp3", None, "rock"),
    ] {
        let mut record = record_for(path);
        record.technical.bpm = bpm;
        record.creative.genre = vec![genre.to_string()];
        record.technical.tags.artist = Some("The Band".to_string());
        store.upsert(&record).await.expect("upsert");
    }

    store.rebuild_criteria().await.expect("first rebuild");
    let first = std::fs::read(dir.path().join(CRITERIA_STORE_FILE)).expect("read");
    store.rebuild_criteria().await.expect("second rebuild");
    let second = std::fs::read(dir.path().join(CRITERIA_STORE_FILE)).expect("read");
    assert_eq!(first, second, "rebuild is byte-identical without upserts");

    let criteria = store.rebuild_criteria().await.expect("third rebuild");
    // Case-insensitive dedup of genres, one tempo band per bpm value.
    assert_eq!(criteria.genre.len(), 2);
    assert_eq!(
        criteria.tempo_bands,
        [
            "Medium (90-110 BPM)".to_string(),
            "Very Fast (160+ BPM)".to_string()
        ]
    );
    assert_eq!(criteria.artists, ["The Band".to_string()]);
}

#[tokio::test]
async fn electronic_elements_facet_reports_yes_and_no() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    let mut yes = record_for("/m/edm.mp3");
    yes.analysis.electronic_elements = Some(ElectronicElements {
        detected: true,
        ..ElectronicElements::default()
    });
    store.upsert(&yes).await.expect("upsert");

    let mut no = record_for("/m/folk.mp3");
    no.analysis.electronic_elements = Some(ElectronicElements::default());
    store.upsert(&no).await.expect("upsert");

    let criteria = store.rebuild_criteria().await.expect("rebuild");
    assert_eq!(
        criteria.electronic_elements,
        ["No".to_string(), "Yes".to_string()]
    );
}

#[tokio::test]
async fn writes_leave_no_tmp_files_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());

    store
        .upsert(&record_for("/m/a.mp3"))
        .await
        .expect("upsert");
    store.rebuild_criteria().await.expect("rebuild");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "tmp files left behind: {leftovers:?}");
    assert!(dir.path().join(MAIN_STORE_FILE).exists());
    assert!(dir.path().join(CRITERIA_STORE_FILE).exists());
}

#[tokio::test]
async fn missing_store_files_read_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LibraryStore::new(dir.path().to_path_buf());
    let main = store.load_main().await.expect("load");
    assert!(main.tracks.is_empty());
}
