//! Configuration module for research-search
//!
//! Handles loading and validating settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

/// Environment variable naming an explicit settings file
pub const SETTINGS_PATH_ENV: &str = "RESEARCH_SETTINGS_PATH";

/// Candidate settings files, in lookup order
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("settings.yml"));
    paths.push(PathBuf::from("config/settings.yml"));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("research-search/settings.yml"));
    }
    paths
}

/// Load settings from the first file found (or defaults), merge the
/// environment and validate the result
pub fn load() -> Result<Settings> {
    let mut settings = match candidate_paths().into_iter().find(|p| p.exists()) {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            Settings::from_file(&path)?
        }
        None => {
            info!("No settings file found, using defaults");
            Settings::default()
        }
    };

    settings.merge_env();
    settings.validate()?;
    Ok(settings)
}
