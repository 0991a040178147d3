//! Shared foundational types used across the expanse macro expansion engine.
//!
//! This crate provides content hashing for cache keys, interned names for the
//! persistent name table, and timeout values used by configuration.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;
pub mod timeout;

pub use hash::{ContentHash, ContentHasher};
pub use ident::{Ident, Interner};
pub use timeout::{ParseTimeoutError, Timeout};
