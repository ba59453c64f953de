/// Client configuration file.
/// Reads client.json from ~/.config/corkboard/client.json (or platform equivalent).
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use corkboard_core::ClientConfig;

pub const API_URL_ENV: &str = "CORKBOARD_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default config path: ~/.config/corkboard/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corkboard")
        .join("client.json")
}

pub fn read_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Load config from path. Falls back to defaults when the file is missing or
/// unreadable.
pub fn load_config(path: &Path) -> ClientConfig {
    match read_config(path) {
        Ok(config) => config,
        Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            log::info!(target: "corkboard.config", "No config at {}, using defaults", path.display());
            ClientConfig::default()
        }
        Err(e) => {
            log::warn!(target: "corkboard.config", "Failed to load config {}: {}", path.display(), e);
            ClientConfig::default()
        }
    }
}

/// Apply an `api_url` override, typically read from `CORKBOARD_API_URL`.
pub fn apply_api_url_override(config: &mut ClientConfig, value: Option<String>) {
    if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        log::info!(target: "corkboard.config", "Using api url {} from {}", url, API_URL_ENV);
        config.api_url = url;
    }
}

/// Config file plus environment overrides.
pub fn load_effective_config(path: &Path) -> ClientConfig {
    let mut config = load_config(path);
    apply_api_url_override(&mut config, std::env::var(API_URL_ENV).ok());
    config
}
