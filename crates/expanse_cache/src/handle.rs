//! The slot holding the live cache instance.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::data::PersistentCacheData;

/// A swappable reference to the open cache, or to nothing when the cache is
/// disabled.
///
/// Readers clone the `Arc` and release the lock immediately, so an instance
/// swapped out while in use stays valid until its last reader finishes.
#[derive(Debug, Default)]
pub struct CacheHandle {
    slot: RwLock<Option<Arc<PersistentCacheData>>>,
}

fn same(a: Option<&Arc<PersistentCacheData>>, b: Option<&Arc<PersistentCacheData>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

impl CacheHandle {
    /// A handle holding `data`.
    pub fn new(data: Option<Arc<PersistentCacheData>>) -> Self {
        Self {
            slot: RwLock::new(data),
        }
    }

    /// The live instance, if any.
    pub fn current(&self) -> Option<Arc<PersistentCacheData>> {
        self.slot.read().clone()
    }

    /// Returns `true` if an instance is live.
    pub fn is_live(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Replaces the held instance with `new` if it is still `expected`
    /// (compared by identity). Returns `true` on success; on failure `new`
    /// is dropped and the slot is unchanged.
    pub fn compare_and_set(
        &self,
        expected: Option<&Arc<PersistentCacheData>>,
        new: Option<Arc<PersistentCacheData>>,
    ) -> bool {
        let mut slot = self.slot.write();
        if !same(slot.as_ref(), expected) {
            return false;
        }
        *slot = new;
        true
    }

    /// Installs `new` only if the slot is empty. On failure `new` is
    /// returned to the caller.
    pub fn install(
        &self,
        new: Arc<PersistentCacheData>,
    ) -> Result<(), Arc<PersistentCacheData>> {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return Err(new);
        }
        *slot = Some(new);
        Ok(())
    }

    /// Empties the slot, returning what it held.
    pub fn take(&self) -> Option<Arc<PersistentCacheData>> {
        self.slot.write().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(dir: &tempfile::TempDir, name: &str) -> Arc<PersistentCacheData> {
        Arc::new(PersistentCacheData::try_create(&dir.path().join(name)).unwrap())
    }

    #[test]
    fn starts_empty() {
        let handle = CacheHandle::default();
        assert!(!handle.is_live());
        assert!(handle.current().is_none());
    }

    #[test]
    fn compare_and_set_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let a = data(&dir, "a");
        let b = data(&dir, "b");
        let handle = CacheHandle::new(Some(a.clone()));

        assert!(!handle.compare_and_set(Some(&b), None));
        assert!(handle.is_live());
        assert!(handle.compare_and_set(Some(&a), None));
        assert!(!handle.is_live());
        assert!(!handle.compare_and_set(Some(&a), None));
        assert!(handle.compare_and_set(None, Some(b.clone())));
        assert!(Arc::ptr_eq(&handle.current().unwrap(), &b));
    }

    #[test]
    fn install_only_into_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let a = data(&dir, "a");
        let b = data(&dir, "b");
        let handle = CacheHandle::default();
        assert!(handle.install(a.clone()).is_ok());
        let rejected = handle.install(b.clone()).unwrap_err();
        assert!(Arc::ptr_eq(&rejected, &b));
        assert!(Arc::ptr_eq(&handle.take().unwrap(), &a));
        assert!(handle.take().is_none());
    }
}
