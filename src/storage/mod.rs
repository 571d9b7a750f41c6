//! Storage Layer
//!
//! Locates the per-user directories the recognizer reads its settings from.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::{self, RecognizerConfig};

/// File name of the recognizer settings inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "platereader", "PlateReader")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Path of the default settings file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Write the default settings unless a file already exists, returning its path
pub fn init_default_config() -> Result<PathBuf> {
    let path = default_config_path()?;
    write_default_config(&path)?;
    Ok(path)
}

/// Write the default settings to `path` if nothing is there yet.
///
/// Returns whether a file was written.
pub fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    config::save_config(&RecognizerConfig::default(), path)?;
    Ok(true)
}
