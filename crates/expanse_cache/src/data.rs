//! The open on-disk cache: name table, expansion store, and index store.

use std::path::{Path, PathBuf};

use expanse_expand::{DeclMacroExpander, ProcMacroExpander, PARSER_VERSION};

use crate::error::CacheError;
use crate::index::{IndexEntry, IndexTree, INDEX_FORMAT_VERSION};
use crate::names::NameTable;
use crate::policy::ExpansionResult;
use crate::store::PersistentMap;

/// File name of the shared name table.
pub const NAMES_FILE: &str = "stub.names";
/// Directory of the expansion store.
pub const EXPANSION_CACHE_DIR: &str = "expansion-cache";
/// Directory of the index store.
pub const INDEX_CACHE_DIR: &str = "expansion-stubs-cache";

/// Versions the two stores are opened with. A store created with any other
/// version is wiped on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheVersions {
    /// Version of the expansion store.
    pub expansions: u32,
    /// Version of the index store.
    pub indexes: u32,
}

impl CacheVersions {
    /// The versions of this build of the engine.
    pub fn current() -> Self {
        let expanders = DeclMacroExpander::EXPANDER_VERSION + ProcMacroExpander::EXPANDER_VERSION;
        Self {
            expansions: expanders + PARSER_VERSION + 2,
            indexes: expanders + INDEX_FORMAT_VERSION,
        }
    }
}

impl Default for CacheVersions {
    fn default() -> Self {
        Self::current()
    }
}

/// Both stores and the name table, opened together from one base directory.
#[derive(Debug)]
pub struct PersistentCacheData {
    dir: PathBuf,
    names: NameTable,
    expansions: PersistentMap<ExpansionResult>,
    indexes: PersistentMap<IndexEntry>,
}

impl PersistentCacheData {
    /// Opens the cache in `dir` with the current versions.
    pub fn try_create(dir: &Path) -> Result<Self, CacheError> {
        Self::try_create_with_versions(dir, CacheVersions::current())
    }

    /// Opens the cache in `dir`.
    ///
    /// If the name table had to be created or repaired, the index store is
    /// wiped: its entries refer to name ids that may no longer exist.
    pub fn try_create_with_versions(dir: &Path, versions: CacheVersions) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(CacheError::io(dir))?;

        let (names, status) = NameTable::open(&dir.join(NAMES_FILE))?;
        let index_dir = dir.join(INDEX_CACHE_DIR);
        if status.invalidates_ids() && index_dir.exists() {
            tracing::debug!(dir = %index_dir.display(), ?status, "name table changed, wiping index store");
            std::fs::remove_dir_all(&index_dir).map_err(CacheError::io(&index_dir))?;
        }

        let expansions =
            PersistentMap::open_clean_or_reset_broken(&dir.join(EXPANSION_CACHE_DIR), versions.expansions)?;
        let indexes = PersistentMap::open_clean_or_reset_broken(&index_dir, versions.indexes)?;

        tracing::debug!(dir = %dir.display(), names = names.len(), "opened macro expansion cache");
        Ok(Self {
            dir: dir.to_path_buf(),
            names,
            expansions,
            indexes,
        })
    }

    /// The base directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The shared name table.
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// The expansion store.
    pub fn expansions(&self) -> &PersistentMap<ExpansionResult> {
        &self.expansions
    }

    /// The index store.
    pub fn indexes(&self) -> &PersistentMap<IndexEntry> {
        &self.indexes
    }

    /// Converts a builder result into an index entry, interning its names.
    ///
    /// New names live only in memory until [`NameTable::flush`]; flush them
    /// before the entry is stored.
    pub fn encode_index(&self, tree: Option<&IndexTree>) -> IndexEntry {
        IndexEntry::encode(tree, &self.names)
    }

    /// Converts an index entry back into a builder result.
    pub fn decode_index(&self, entry: &IndexEntry) -> Result<Option<IndexTree>, CacheError> {
        entry.decode(&self.names)
    }

    /// Forces the name table and both stores to disk.
    ///
    /// The name table goes first so that no stored tree refers to a name
    /// that is not on disk yet.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.names.flush()?;
        self.expansions.flush()?;
        self.indexes.flush()
    }

    /// Flushes and closes everything, logging rather than returning errors.
    pub fn close(&self) {
        if let Err(e) = self.names.flush() {
            tracing::warn!(error = %e, "failed to flush name table");
        }
        if let Err(e) = self.expansions.close() {
            tracing::warn!(error = %e, "failed to close expansion store");
        }
        if let Err(e) = self.indexes.close() {
            tracing::warn!(error = %e, "failed to close index store");
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.expansions.is_closed()
    }
}
