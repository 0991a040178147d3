//! Configuration discovery shared by every command.
//!
//! Finds `expanse.toml` (explicit `--config` path, or the nearest one above
//! the current directory), fills in the helper defaults for this binary, and
//! resolves the cache directory.

use std::fs;
use std::path::{Path, PathBuf};

use expanse_config::{load_config, load_config_from_str, resolve_cache_dir, EngineConfig, CONFIG_FILE};

use crate::worker::PROC_WORKER_COMMAND;
use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing
/// `expanse.toml`.
pub fn find_config_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Loads the engine configuration for this invocation.
///
/// If `--config` is given it must point at a readable file (or a directory
/// holding `expanse.toml`). Otherwise the nearest `expanse.toml` above the
/// current directory is used, falling back to the defaults.
pub fn load_engine_config(global: &GlobalArgs) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let (mut config, base) = match global.config {
        Some(ref path) => {
            let path = PathBuf::from(path);
            let file = if path.is_dir() { path.join(CONFIG_FILE) } else { path };
            let content = fs::read_to_string(&file)
                .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
            let base = file.parent().map(Path::to_path_buf);
            (load_config_from_str(&content)?, base)
        }
        None => match find_config_dir(&std::env::current_dir()?) {
            Some(dir) => (load_config(&dir)?, Some(dir)),
            None => (EngineConfig::default(), None),
        },
    };

    if let (Some(dir), Some(base)) = (config.cache.dir.as_mut(), base) {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }
    use_builtin_helper(&mut config);
    Ok(config)
}

/// With no helper configured, this binary is its own helper.
pub fn use_builtin_helper(config: &mut EngineConfig) {
    let proc_macro = &mut config.proc_macro;
    if proc_macro.helper.is_some() {
        return;
    }
    match std::env::current_exe() {
        Ok(exe) => proc_macro.helper = Some(exe),
        Err(e) => {
            tracing::warn!(error = %e, "cannot locate the running executable, procedural macros are unavailable");
            return;
        }
    }
    if proc_macro.helper_args.is_empty() {
        proc_macro.helper_args = vec![PROC_WORKER_COMMAND.to_string()];
    }
}

/// The cache directory: `--cache-dir` wins over the configuration.
pub fn cache_dir(config: &EngineConfig, global: &GlobalArgs) -> PathBuf {
    match global.cache_dir {
        Some(ref dir) => PathBuf::from(dir),
        None => resolve_cache_dir(config),
    }
}
