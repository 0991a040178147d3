//! Resolution of settings that depend on the environment.

use crate::types::EngineConfig;
use std::path::PathBuf;

/// Environment variable overriding the cache base directory.
pub const CACHE_DIR_ENV: &str = "EXPANSE_CACHE_DIR";

/// Resolves the cache base directory from the configuration and the process
/// environment.
///
/// Precedence: `[cache] dir`, then `$EXPANSE_CACHE_DIR`, then
/// `$XDG_CACHE_HOME/expanse/macros`, then `$HOME/.cache/expanse/macros`,
/// then `./.expanse-cache`.
pub fn resolve_cache_dir(config: &EngineConfig) -> PathBuf {
    resolve_cache_dir_with(config, |key| std::env::var(key).ok())
}

/// Same as [`resolve_cache_dir`] with an injectable environment lookup.
pub fn resolve_cache_dir_with(
    config: &EngineConfig,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(dir) = &config.cache.dir {
        return dir.clone();
    }
    let non_empty = |key: &str| env(key).filter(|v| !v.is_empty());
    if let Some(dir) = non_empty(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = non_empty("XDG_CACHE_HOME") {
        return PathBuf::from(xdg).join("expanse").join("macros");
    }
    if let Some(home) = non_empty("HOME") {
        return PathBuf::from(home)
            .join(".cache")
            .join("expanse")
            .join("macros");
    }
    PathBuf::from(".expanse-cache")
}
