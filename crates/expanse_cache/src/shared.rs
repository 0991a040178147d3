//! The process-wide expansion cache and its enable/disable lifecycle.
//!
//! [`MacroExpansionSharedCache`] is either enabled, with a live
//! [`PersistentCacheData`] in its [`CacheHandle`], or disabled. It starts
//! enabled if asked to and the stores open. Any I/O failure afterwards
//! swaps the handle to empty, closes the instance, and logs a warning; the
//! value being looked up is computed and returned as if there were no cache.
//! [`set_enabled`](MacroExpansionSharedCache::set_enabled) re-opens or
//! closes the stores at runtime.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use expanse_common::ContentHash;
use expanse_expand::{mix_hash, ExpansionOk, MacroCallData, MacroExpander};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data::{CacheVersions, PersistentCacheData};
use crate::error::CacheError;
use crate::handle::CacheHandle;
use crate::index::{IndexBuilder, IndexTree};
use crate::policy::{DistrustTransientErrors, ExpansionResult, RetrievalPolicy, TrustAll};
use crate::stats::{CacheCounters, CacheStats};
use crate::store::PersistentMap;

/// An expansion together with the index tree of its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionIndex {
    /// The key both were stored under.
    pub hash: ContentHash,
    /// The expansion.
    pub expansion: ExpansionOk,
    /// The index tree of `expansion.text`.
    pub index: IndexTree,
}

/// Persistent cache of macro expansions and their index trees.
#[derive(Debug)]
pub struct MacroExpansionSharedCache {
    dir: PathBuf,
    versions: CacheVersions,
    enabled: AtomicBool,
    handle: CacheHandle,
    counters: CacheCounters,
}

impl MacroExpansionSharedCache {
    /// Creates the cache over `dir`, opening the stores if `enabled`.
    ///
    /// Never fails: if the stores cannot be opened the cache starts disabled.
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self::with_versions(dir, enabled, CacheVersions::current())
    }

    /// Like [`new`](Self::new) with explicit store versions.
    pub fn with_versions(dir: impl Into<PathBuf>, enabled: bool, versions: CacheVersions) -> Self {
        let cache = Self {
            dir: dir.into(),
            versions,
            enabled: AtomicBool::new(enabled),
            handle: CacheHandle::default(),
            counters: CacheCounters::default(),
        };
        if enabled {
            if let Some(data) = cache.try_create_data() {
                cache.handle.compare_and_set(None, Some(data));
            }
        }
        cache
    }

    fn try_create_data(&self) -> Option<Arc<PersistentCacheData>> {
        match PersistentCacheData::try_create_with_versions(&self.dir, self.versions) {
            Ok(data) => Some(Arc::new(data)),
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to open macro expansion cache");
                None
            }
        }
    }

    /// The base directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns `true` if the cache is switched on and its stores are open.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.handle.is_live()
    }

    /// Switches the cache on or off.
    ///
    /// Switching on while an instance is live keeps that instance. Otherwise
    /// the stores are opened; if another thread installs an instance first,
    /// the new one is closed. Switching off closes the live instance.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if enabled {
            if self.handle.is_live() {
                return;
            }
            if let Some(data) = self.try_create_data() {
                if let Err(redundant) = self.handle.install(data) {
                    redundant.close();
                }
            }
        } else if let Some(data) = self.handle.take() {
            data.close();
            tracing::debug!(dir = %self.dir.display(), "macro expansion cache disabled");
        }
    }

    /// Flushes the live stores, if any.
    pub fn flush(&self) {
        if let Some(data) = self.handle.current() {
            if let Err(e) = data.flush() {
                self.on_error(&data, &e);
            }
        }
    }

    /// Closes the live stores. Safe to call more than once and from several
    /// threads; the instance is closed exactly once.
    pub fn dispose(&self) {
        loop {
            let last = self.handle.current();
            if self.handle.compare_and_set(last.as_ref(), None) {
                if let Some(data) = last {
                    data.close();
                }
                return;
            }
        }
    }

    /// Counters since startup.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn on_error(&self, data: &Arc<PersistentCacheData>, error: &CacheError) {
        if self.handle.compare_and_set(Some(data), None) {
            data.close();
        }
        tracing::warn!(dir = %self.dir.display(), %error, "macro expansion cache disabled after an error");
    }

    fn live(&self) -> Option<Arc<PersistentCacheData>> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        self.handle.current()
    }

    fn get_or_compute_in<V, P>(
        &self,
        data: &Arc<PersistentCacheData>,
        map: &PersistentMap<V>,
        key: ContentHash,
        policy: &P,
        compute: impl FnOnce() -> V,
        prepare_store: impl FnOnce(&V) -> Result<bool, CacheError>,
    ) -> V
    where
        V: Serialize + DeserializeOwned,
        P: RetrievalPolicy<V>,
    {
        match map.get(&key) {
            Ok(Some(value)) if policy.is_reusable(&value) => {
                self.counters.hit();
                tracing::trace!(%key, "cache hit");
                return value;
            }
            Ok(Some(_)) => {
                self.counters.recompute();
                tracing::trace!(%key, "cached value rejected, recomputing");
            }
            Ok(None) => {
                self.counters.miss();
                tracing::trace!(%key, "cache miss");
            }
            Err(e) => {
                self.counters.read_failure();
                self.on_error(data, &e);
                return compute();
            }
        }

        let value = compute();
        let stored = prepare_store(&value).and_then(|storable| {
            if storable {
                map.put(&key, &value)
            } else {
                Ok(())
            }
        });
        if let Err(e) = stored {
            self.counters.store_failure();
            self.on_error(data, &e);
        }
        value
    }

    /// Returns the expansion stored under `hash` if `policy` accepts it,
    /// otherwise computes, stores, and returns a fresh one.
    ///
    /// Cache failures are never visible to the caller. A cancelled
    /// expansion is returned but not stored.
    pub fn get_or_compute<P>(
        &self,
        hash: ContentHash,
        policy: &P,
        compute: impl FnOnce() -> ExpansionResult,
    ) -> ExpansionResult
    where
        P: RetrievalPolicy<ExpansionResult>,
    {
        let Some(data) = self.live() else {
            return compute();
        };
        self.get_or_compute_in(&data, data.expansions(), hash, policy, compute, |value| {
            Ok(match value {
                Ok(_) => true,
                Err(e) => e.is_storable(),
            })
        })
    }

    /// Expands through the cache with the distrust-transient-errors policy.
    ///
    /// If the definition or call cannot be hashed, expands without caching.
    pub fn cached_expand<E: MacroExpander>(
        &self,
        expander: &E,
        def: &E::Def,
        call: &MacroCallData,
    ) -> ExpansionResult {
        self.cached_expand_with(expander, def, call, &DistrustTransientErrors)
    }

    /// Expands through the cache with an explicit policy.
    pub fn cached_expand_with<E, P>(
        &self,
        expander: &E,
        def: &E::Def,
        call: &MacroCallData,
        policy: &P,
    ) -> ExpansionResult
    where
        E: MacroExpander,
        P: RetrievalPolicy<ExpansionResult>,
    {
        match mix_hash(def, call) {
            Some(hash) => self.get_or_compute(hash, policy, || expander.expand(def, call)),
            None => expander.expand(def, call),
        }
    }

    /// The expansion stored under `hash`, whatever it is, without computing
    /// anything. Transient errors are returned too.
    pub fn get_expansion_if_cached(&self, hash: ContentHash) -> Option<ExpansionResult> {
        let data = self.live()?;
        match data.expansions().get(&hash) {
            Ok(value) => value,
            Err(e) => {
                self.counters.read_failure();
                self.on_error(&data, &e);
                None
            }
        }
    }

    /// Returns the index tree stored under `hash`, or builds it from `text`
    /// and stores it. `None` means the builder produced no tree.
    pub fn cached_build_index(
        &self,
        hash: ContentHash,
        text: &str,
        builder: &dyn IndexBuilder,
    ) -> Option<IndexTree> {
        let Some(data) = self.live() else {
            return builder.build_index(text);
        };
        let entry = self.get_or_compute_in(
            &data,
            data.indexes(),
            hash,
            &TrustAll,
            || data.encode_index(builder.build_index(text).as_ref()),
            // The entry refers to names by id; they must be on disk first.
            |_| data.names().flush().map(|()| true),
        );
        match data.decode_index(&entry) {
            Ok(tree) => tree,
            Err(e) => {
                self.counters.read_failure();
                self.on_error(&data, &e);
                builder.build_index(text)
            }
        }
    }

    /// The index tree stored under `hash`, without building anything.
    pub fn get_index_for(&self, hash: ContentHash) -> Option<IndexTree> {
        let data = self.live()?;
        let decoded = data
            .indexes()
            .get(&hash)
            .and_then(|entry| entry.map(|e| data.decode_index(&e)).transpose());
        match decoded {
            Ok(tree) => tree.flatten(),
            Err(e) => {
                self.counters.read_failure();
                self.on_error(&data, &e);
                None
            }
        }
    }

    /// Expands through the cache and indexes the expansion text, both under
    /// the same key.
    ///
    /// Returns `None` if the inputs cannot be hashed, the expansion failed,
    /// or the builder produced no tree.
    pub fn create_expansion_index<E: MacroExpander>(
        &self,
        expander: &E,
        def: &E::Def,
        call: &MacroCallData,
        builder: &dyn IndexBuilder,
    ) -> Option<ExpansionIndex> {
        let hash = mix_hash(def, call)?;
        let expansion = self
            .get_or_compute(hash, &DistrustTransientErrors, || expander.expand(def, call))
            .ok()?;
        let index = self.cached_build_index(hash, &expansion.text, builder)?;
        Some(ExpansionIndex {
            hash,
            expansion,
            index,
        })
    }
}

impl Drop for MacroExpansionSharedCache {
    fn drop(&mut self) {
        self.dispose();
    }
}
