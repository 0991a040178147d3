//! Parsing and validation of `expanse.toml` engine configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`EngineConfig`] covering the persistent cache toggle, procedural macro
//! workers, and declarative expander limits.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_config_or_default, CONFIG_FILE};
pub use resolve::{resolve_cache_dir, resolve_cache_dir_with, CACHE_DIR_ENV};
pub use types::*;
