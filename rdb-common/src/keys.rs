//! Track key normalization
//!
//! A track's identity in every store is its path with separators normalized
//! to forward slashes and the whole string lowercased. Two paths that differ
//! only in separator style or letter case collapse to the same key, so a
//! library moved between platforms keeps its records.

use std::path::Path;

/// Derive the canonical store key for a file path.
///
/// Backslashes become forward slashes, then the result is lowercased.
/// No filesystem access, idempotent.
pub fn track_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Same as [`track_key`] for a [`Path`], using its lossy UTF-8 form.
pub fn track_key_for(path: &Path) -> String {
    track_key(&path.to_string_lossy())
}

/// Short deterministic digest of a path, for cache filenames.
///
/// FNV-1a over the normalized key, rendered as the first ten hex chars.
/// Stable across runs and platforms.
pub fn path_hash(path: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in track_key(path).as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_case_collapse() {
        assert_eq!(
            track_key(r"C:\Music\Song.MP3"),
            track_key("c:/music/song.mp3")
        );
    }

    #[test]
    fn idempotent() {
        let once = track_key("/Music/Song.mp3");
        assert_eq!(track_key(&once), once);
    }

    #[test]
    fn hash_is_stable_and_ten_chars() {
        let a = path_hash("/Music/Song.mp3");
        let b = path_hash(r"\music\SONG.mp3");
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn distinct_paths_distinct_hashes() {
        assert_ne!(path_hash("/a/one.mp3"), path_hash("/a/two.mp3"));
    }
}
