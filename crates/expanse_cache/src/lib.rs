//! Persistent caching of macro expansions and their index trees.
//!
//! Expansions are stored by the content hash of their definition and call in
//! a versioned [`PersistentMap`]; index trees of the expansion text live in a
//! second map under the same key, with names in the shared [`NameTable`].
//! [`MacroExpansionSharedCache`] owns both behind a swappable handle and
//! disables itself on any I/O failure, so cache trouble never surfaces as an
//! expansion failure. [`MacroExpansionService`] is the caller-facing entry
//! point that picks the expander and retrieval policy for a definition.

#![warn(missing_docs)]

pub mod data;
pub mod error;
pub mod handle;
pub mod index;
pub mod meta;
pub mod names;
pub mod policy;
pub mod service;
pub mod shared;
pub mod stats;
pub mod store;

pub use data::{CacheVersions, PersistentCacheData, EXPANSION_CACHE_DIR, INDEX_CACHE_DIR, NAMES_FILE};
pub use error::CacheError;
pub use handle::CacheHandle;
pub use index::{IndexBuilder, IndexEntry, IndexNode, IndexTree, ItemIndexBuilder, ItemKind};
pub use meta::StoreMeta;
pub use names::{NameTable, NameTableStatus};
pub use policy::{DistrustTransientErrors, ExpansionResult, RetrievalPolicy, TrustAll};
pub use service::MacroExpansionService;
pub use shared::{ExpansionIndex, MacroExpansionSharedCache};
pub use stats::CacheStats;
pub use store::PersistentMap;
