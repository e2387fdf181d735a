// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Parse and validate TOML text already in memory.
pub fn load_from_str(contents: &str) -> Result<ConfigFile> {
    let raw: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults for every omitted section and key.
/// - Checks worker ids, commands, durations and numeric bounds.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    debug!(
        path = %path.as_ref().display(),
        workers = config.workers.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the all-defaults
/// configuration (no workers, data under `./data`).
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        load_and_validate(path)
    } else {
        debug!(path = %path.display(), "config file not found; using defaults");
        ConfigFile::try_from(RawConfigFile::default())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Warden.toml")
}
