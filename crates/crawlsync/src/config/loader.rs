use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::config::schema::SyncConfig;
use crate::error::ConfigError;

/// Overrides `apiBaseUrl` when set.
pub const ENV_API_BASE_URL: &str = "CRAWLSYNC_API_BASE_URL";
/// Overrides `streamUrl` when set.
pub const ENV_STREAM_URL: &str = "CRAWLSYNC_STREAM_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<SyncConfig, ConfigError> {
    let mut config: SyncConfig = serde_json::from_str(content)?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Loads `path` if given, otherwise the default config file if it exists,
/// otherwise built-in defaults. Environment overrides apply in every case.
pub fn load_or_default(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => {
            log::debug!("Using config file {}", path.display());
            load_config(path)
        }
        _ => {
            log::debug!("No config file found, using defaults");
            let mut config = SyncConfig::default();
            apply_env_overrides(&mut config);
            validate_config(&config)?;
            Ok(config)
        }
    }
}

/// `<platform config dir>/crawlsync/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crawlsync").join("config.json"))
}

fn apply_env_overrides(config: &mut SyncConfig) {
    if let Some(url) = env_value(ENV_API_BASE_URL) {
        config.api_base_url = url;
    }
    if let Some(url) = env_value(ENV_STREAM_URL) {
        config.stream_url = url;
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_config(config: &SyncConfig) -> Result<(), ConfigError> {
    validate_url("apiBaseUrl", &config.api_base_url, &["http", "https"])?;
    validate_url("streamUrl", &config.stream_url, &["ws", "wss"])?;

    if config.reconnect.delay_ms == 0 {
        return Err(ConfigError::Validation {
            message: "reconnect.delayMs must be greater than zero".to_string(),
        });
    }
    if let Some(max) = config.reconnect.max_delay_ms {
        if max < config.reconnect.delay_ms {
            return Err(ConfigError::Validation {
                message: format!(
                    "reconnect.maxDelayMs ({}) must not be less than reconnect.delayMs ({})",
                    max, config.reconnect.delay_ms
                ),
            });
        }
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "requestTimeoutMs must be greater than zero".to_string(),
        });
    }
    if config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "connectTimeoutMs must be greater than zero".to_string(),
        });
    }
    if config.change_buffer == 0 {
        return Err(ConfigError::Validation {
            message: "changeBuffer must be greater than zero".to_string(),
        });
    }

    Ok(())
}

fn validate_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Validation {
        message: format!("{} '{}' is not a valid URL: {}", field, value, e),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Validation {
            message: format!(
                "{} '{}' must use one of: {}",
                field,
                value,
                schemes.join(", ")
            ),
        });
    }

    Ok(())
}
