//! Embedded tag extraction
//!
//! Reads ID3 / AIFF chunk tags into a [`TagMap`] using lofty. Tag reading is
//! best-effort: any failure yields empty tags and the track analyzes on.

use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use rdb_common::model::TagMap;
use std::path::Path;
use thiserror::Error;

/// Tag reading errors (non-fatal; callers fall back to empty tags)
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Failed to read file: {0}")]
    ReadError(String),

    #[error("No metadata found")]
    NoMetadata,
}

/// lofty-backed tag reader.
pub struct TagReader {}

impl TagReader {
    pub fn new() -> Self {
        Self {}
    }

    /// Read the tag map for `path`.
    pub fn read(&self, path: &Path) -> Result<TagMap, TagError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| TagError::ReadError(e.to_string()))?
            .read()
            .map_err(|e| TagError::ReadError(e.to_string()))?;

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .ok_or(TagError::NoMetadata)?;

        let genre = tag
            .genre()
            .map(|g| split_genres(&g))
            .unwrap_or_default();

        Ok(TagMap {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            year: tag.year().map(|y| y as i32),
            genre,
            track: tag.track(),
            comment: tag.comment().map(|s| s.to_string()),
            composer: tag.get_string(&ItemKey::Composer).map(|s| s.to_string()),
            copyright: tag
                .get_string(&ItemKey::CopyrightMessage)
                .map(|s| s.to_string()),
            tbpm: tag.get_string(&ItemKey::IntegerBpm).map(|s| s.to_string()),
            key: tag.get_string(&ItemKey::InitialKey).map(|s| s.to_string()),
            mood: tag.get_string(&ItemKey::Mood).map(|s| s.to_string()),
        })
    }

    /// Read tags, degrading to an empty map on any failure.
    pub fn read_or_empty(&self, path: &Path) -> TagMap {
        match self.read(path) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "Tag read failed, using empty tags");
                TagMap::default()
            }
        }
    }
}

impl Default for TagReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a genre tag on `;` and `/` separators into trimmed entries.
fn split_genres(raw: &str) -> Vec<String> {
    raw.split(|c| c == ';' || c == '/')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

/// Parse a raw `TBPM` frame into a tempo override.
///
/// Accepts plain integers and strings with trailing text (`"148 bpm"`).
/// Only values in [1, 399] are honored.
pub fn parse_tbpm(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value = digits.parse::<u32>().ok()?;
    (1..=399).contains(&value).then_some(value)
}
