// Cache path utilities.
// Resolves the XDG locations for the persistent store and configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use sha2::{Digest, Sha256};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gtrend")
}

/// Get the base cache directory (~/.cache/gtrend on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Directory holding persisted store entries.
pub fn store_dir() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join("store"))
}

/// Path to the JSON configuration file.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
}

/// File holding the value for `key` inside a store directory.
///
/// Keys can be long and contain JSON punctuation, so the filename is the
/// hex SHA-256 of the key. The key itself is kept inside the file.
pub fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", hex::encode(Sha256::digest(key.as_bytes()))))
}
