//! `expanse cache`: inspect, flush, or clear the on-disk caches.

use std::fs;
use std::path::{Path, PathBuf};

use expanse_cache::store::is_store_dir;
use expanse_cache::{
    CacheVersions, PersistentCacheData, EXPANSION_CACHE_DIR, INDEX_CACHE_DIR, NAMES_FILE,
};
use serde::Serialize;

use crate::settings;
use crate::{CacheAction, GlobalArgs};

/// What `cache stats` reports.
#[derive(Debug, Serialize)]
pub struct CacheReport {
    /// Base directory.
    pub dir: String,
    /// Version the expansion map is opened with.
    pub expansions_version: u32,
    /// Version the index map is opened with.
    pub indexes_version: u32,
    /// Stored expansions.
    pub expansions: usize,
    /// Stored index trees.
    pub indexes: usize,
    /// Interned names in `stub.names`.
    pub names: usize,
}

/// Runs a `cache` subcommand.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = settings::load_engine_config(global)?;
    let dir = settings::cache_dir(&config, global);
    match action {
        CacheAction::Stats { json } => {
            let report = stats(&dir)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("cache directory: {}", report.dir);
                println!(
                    "expansions:      {} (version {})",
                    report.expansions, report.expansions_version
                );
                println!(
                    "index trees:     {} (version {})",
                    report.indexes, report.indexes_version
                );
                println!("names:           {}", report.names);
            }
        }
        CacheAction::Flush => {
            flush(&dir)?;
            if !global.quiet {
                println!("flushed {}", dir.display());
            }
        }
        CacheAction::Clear => {
            let removed = clear(&dir)?;
            if !global.quiet {
                println!("removed {} cache file(s) from {}", removed.len(), dir.display());
            }
        }
    }
    Ok(0)
}

/// Opens the caches (repairing them if needed) and counts their contents.
pub fn stats(dir: &Path) -> Result<CacheReport, Box<dyn std::error::Error>> {
    let data = PersistentCacheData::try_create(dir)?;
    let versions = CacheVersions::current();
    let report = CacheReport {
        dir: dir.display().to_string(),
        expansions_version: versions.expansions,
        indexes_version: versions.indexes,
        expansions: data.expansions().len()?,
        indexes: data.indexes().len()?,
        names: data.names().len(),
    };
    data.close();
    Ok(report)
}

/// Opens the caches, which applies version checks and repairs, and syncs
/// them to disk.
pub fn flush(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = PersistentCacheData::try_create(dir)?;
    let result = data.flush();
    data.close();
    Ok(result?)
}

/// Removes the name table and both maps. Anything else in `dir` is left
/// alone, and a map directory without store metadata is not touched.
pub fn clear(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut removed = Vec::new();
    for name in [EXPANSION_CACHE_DIR, INDEX_CACHE_DIR] {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        if !is_store_dir(&path) {
            tracing::warn!(path = %path.display(), "not a cache store, leaving it in place");
            continue;
        }
        fs::remove_dir_all(&path).map_err(|e| format!("cannot remove {}: {e}", path.display()))?;
        removed.push(path);
    }
    let names = dir.join(NAMES_FILE);
    if names.is_file() {
        fs::remove_file(&names).map_err(|e| format!("cannot remove {}: {e}", names.display()))?;
        removed.push(names);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expanse_cache::MacroExpansionService;
    use expanse_config::EngineConfig;
    use expanse_expand::{DeclMacroDef, MacroCallData, MacroDefinition};

    fn populate(dir: &Path) {
        let service = MacroExpansionService::from_config(&EngineConfig::default(), dir);
        let def = MacroDefinition::Declarative(DeclMacroDef::new(
            "make",
            "($n:ident) => { struct $n; }",
        ));
        for name in ["A", "B"] {
            let call = MacroCallData::function_like(name);
            service.expand(&def, &call).unwrap();
            service.expand_with_index(&def, &call).unwrap();
        }
        service.dispose();
    }

    #[test]
    fn stats_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let report = stats(dir.path()).unwrap();
        assert_eq!(report.expansions, 2);
        assert_eq!(report.indexes, 2);
        assert_eq!(report.names, 2);
        assert_eq!(report.expansions_version, CacheVersions::current().expansions);
    }

    #[test]
    fn stats_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = stats(&dir.path().join("fresh")).unwrap();
        assert_eq!(report.expansions, 0);
        assert_eq!(report.indexes, 0);
    }

    #[test]
    fn clear_removes_cache_files_only() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        let removed = clear(dir.path()).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join(NAMES_FILE).exists());
        assert_eq!(stats(dir.path()).unwrap().expansions, 0);
    }

    #[test]
    fn clear_skips_foreign_directories() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join(EXPANSION_CACHE_DIR);
        fs::create_dir_all(&foreign).unwrap();
        fs::write(foreign.join("data"), "x").unwrap();
        assert!(clear(dir.path()).unwrap().is_empty());
        assert!(foreign.join("data").exists());
    }

    #[test]
    fn flush_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        flush(dir.path()).unwrap();
        assert!(is_store_dir(&dir.path().join(EXPANSION_CACHE_DIR)));
        assert!(is_store_dir(&dir.path().join(INDEX_CACHE_DIR)));
    }
}
