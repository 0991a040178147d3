//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::EngineConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "expanse.toml";

/// Loads and validates an `expanse.toml` configuration from a directory.
///
/// Reads `<dir>/expanse.toml`, parses it, and validates the values.
pub fn load_config(dir: &Path) -> Result<EngineConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Like [`load_config`], but a missing file yields the default configuration.
pub fn load_config_or_default(dir: &Path) -> Result<EngineConfig, ConfigError> {
    if dir.join(CONFIG_FILE).is_file() {
        load_config(dir)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Parses and validates an `expanse.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable.
fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.proc_macro.workers == 0 {
        return Err(ConfigError::ValidationError(
            "proc_macro.workers must be at least 1".to_string(),
        ));
    }
    if config.proc_macro.timeout.as_millis() == 0 {
        return Err(ConfigError::ValidationError(
            "proc_macro.timeout must be positive".to_string(),
        ));
    }
    if let Some(remote) = &config.proc_macro.remote {
        if remote.launcher.is_empty() {
            return Err(ConfigError::MissingField(
                "proc_macro.remote.launcher".to_string(),
            ));
        }
    }
    if config.expander.max_expansion_size == 0 {
        return Err(ConfigError::ValidationError(
            "expander.max_expansion_size must be positive".to_string(),
        ));
    }
    if config.expander.max_depth == 0 {
        return Err(ConfigError::ValidationError(
            "expander.max_depth must be positive".to_string(),
        ));
    }
    Ok(())
}
