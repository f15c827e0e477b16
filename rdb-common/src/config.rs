//! Configuration loading and library folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable naming the library (db) folder.
pub const LIBRARY_FOLDER_ENV: &str = "RDB_LIBRARY_FOLDER";

/// Resolve the library folder holding `RhythmDB.json` / `CriteriaDB.json`.
///
/// Priority order:
/// 1. Command-line argument (highest)
/// 2. `RDB_LIBRARY_FOLDER` environment variable
/// 3. `library_folder` key in the TOML config file
/// 4. `<home>/RhythmDB` fallback
pub fn resolve_library_folder(cli_arg: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(LIBRARY_FOLDER_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    if let Some(config_path) = config_file_path() {
        if let Ok(contents) = std::fs::read_to_string(&config_path) {
            match toml::from_str::<toml::Value>(&contents) {
                Ok(config) => {
                    if let Some(folder) = config.get("library_folder").and_then(|v| v.as_str()) {
                        return Ok(PathBuf::from(folder));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Config file exists but failed to parse, ignoring"
                    );
                }
            }
        }
    }

    dirs::home_dir()
        .map(|home| home.join("RhythmDB"))
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
}

/// Location of the optional TOML config file: `<config dir>/rhythmdb/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rhythmdb").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let folder = resolve_library_folder(Some("/tmp/lib")).expect("resolves");
        assert_eq!(folder, PathBuf::from("/tmp/lib"));
    }
}
