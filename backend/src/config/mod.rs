//! TOML settings stored under the user's config directory

mod settings;

pub use settings::*;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<config dir>/quran-offline`, or `./quran-offline` without a home
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quran-offline")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load the user's settings, writing defaults on first run.
pub fn load_or_create_default() -> Result<Settings> {
    load_or_create(&config_path())
}

/// Read settings from `path`; missing sections take their defaults. A missing
/// file is created with the full default settings.
pub fn load_or_create(path: &Path) -> Result<Settings> {
    match fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).with_context(|| format!("invalid settings in {:?}", path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let settings = Settings::default();
            save_to(path, &settings)?;
            info!("Wrote default settings to {:?}", path);
            Ok(settings)
        }
        Err(e) => Err(e).with_context(|| format!("cannot read {:?}", path)),
    }
}

pub fn save(settings: &Settings) -> Result<()> {
    save_to(&config_path(), settings)
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(settings)?)
        .with_context(|| format!("cannot write {:?}", path))
}
