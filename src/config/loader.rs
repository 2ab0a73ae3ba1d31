// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{EngineSettings, RawEngineSettings};
use crate::errors::Result;

/// Load a settings file and return the raw, unvalidated form.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for
/// the checked [`EngineSettings`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let settings: RawEngineSettings = toml::from_str(&contents)?;

    Ok(settings)
}

/// Load a settings file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineSettings> {
    let raw = load_from_path(&path)?;
    EngineSettings::try_from(raw)
}

/// `Rulekit.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Rulekit.toml")
}
