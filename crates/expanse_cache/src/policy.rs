//! Retrieval policies: whether a value just read from a store may be used.

use expanse_expand::{ExpansionOk, MacroExpansionError};

/// The value stored in the expansion cache.
pub type ExpansionResult = Result<ExpansionOk, MacroExpansionError>;

/// Decides whether a value read from a store is returned as-is or dropped,
/// recomputed, and overwritten.
pub trait RetrievalPolicy<V: ?Sized> {
    /// Returns `true` if `value` may be returned without recomputation.
    fn is_reusable(&self, value: &V) -> bool;
}

/// Every stored value is reusable. Used for the index cache and for
/// declarative expansions, which are deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAll;

impl<V: ?Sized> RetrievalPolicy<V> for TrustAll {
    fn is_reusable(&self, _value: &V) -> bool {
        true
    }
}

/// Successes are reusable; errors only if
/// [`MacroExpansionError::can_cache_error`] says they are stable.
///
/// Transient errors stay in the store, visible to cache-only lookups, but are
/// recomputed on every expansion.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistrustTransientErrors;

impl RetrievalPolicy<ExpansionResult> for DistrustTransientErrors {
    fn is_reusable(&self, value: &ExpansionResult) -> bool {
        match value {
            Ok(_) => true,
            Err(err) => err.can_cache_error(),
        }
    }
}
