//! Per-store metadata recording the format and version a store was created
//! with.
//!
//! Stored as `store.json` inside each persistent map's directory. A store
//! whose metadata is missing, unreadable, or records another version is
//! wiped before use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the metadata file within a store directory.
pub const STORE_META_FILE: &str = "store.json";

/// Format identifier written into every store's metadata.
const STORE_FORMAT: &str = "expanse-store";

/// Metadata of one persistent map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Always `"expanse-store"`.
    pub format: String,

    /// Version the store was opened with. Entries are only valid for the
    /// same version.
    pub version: u32,

    /// Engine release that created the store. Informational only.
    pub engine_version: String,
}

impl StoreMeta {
    /// Metadata for a fresh store of the given version.
    pub fn new(version: u32) -> Self {
        Self {
            format: STORE_FORMAT.to_string(),
            version,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Loads the metadata from a store directory, returning `None` if the
    /// file doesn't exist or can't be parsed.
    pub fn load(store_dir: &Path) -> Option<Self> {
        let path = store_dir.join(STORE_META_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the metadata, creating the directory if needed.
    pub fn save(&self, store_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(store_dir).map_err(CacheError::io(store_dir))?;
        let path = store_dir.join(STORE_META_FILE);
        let json = serde_json::to_string_pretty(self).map_err(CacheError::serialization)?;
        std::fs::write(&path, json).map_err(CacheError::io(&path))
    }

    /// Returns `true` if entries of a store with this metadata can be read
    /// by a store opened with `version`.
    pub fn is_compatible(&self, version: u32) -> bool {
        self.format == STORE_FORMAT && self.version == version
    }
}
