pub mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::errors::AgentError;

pub const CONFIG_PATH_ENV: &str = "AGENTYARD_CONFIG";
const APP_DIR_NAME: &str = "agentyard";
const STORE_FILE_NAME: &str = "sessions.json";

/// Config file location: explicit path, then `$AGENTYARD_CONFIG`, then the
/// per-user config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(value));
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
}

pub fn parse_config(text: &str) -> Result<AppConfig, AgentError> {
    let config: AppConfig = toml::from_str(text).map_err(|e| AgentError::Config {
        key: "<file>".to_string(),
        message: e.to_string(),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), AgentError> {
    if config.default_cols == 0 {
        return Err(AgentError::Config {
            key: "default_cols".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.default_rows == 0 {
        return Err(AgentError::Config {
            key: "default_rows".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Loads the config, falling back to defaults when the file is missing,
/// unreadable, or invalid.
pub fn load_config(explicit: Option<&Path>) -> AppConfig {
    let Some(path) = config_path(explicit) else {
        log::debug!("No config directory available; using default settings");
        return AppConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => match parse_config(&text) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config at {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config at {}; using defaults", path.display());
            AppConfig::default()
        }
        Err(e) => {
            log::warn!("Failed to read config at {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

/// Where sessions are persisted: configured path, else the per-user data directory.
pub fn resolve_store_path(config: &AppConfig) -> PathBuf {
    if let Some(path) = &config.store_path {
        return path.clone();
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{APP_DIR_NAME}")))
        .join(STORE_FILE_NAME)
}
