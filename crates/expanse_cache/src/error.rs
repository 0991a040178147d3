//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur inside the persistent cache.
///
/// None of these reach callers of the shared cache: any of them disables the
/// cache for the session and the value is recomputed instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A store's `store.json` could not be parsed.
    #[error("failed to parse store metadata at {path}: {reason}")]
    MetadataParse {
        /// The metadata file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// An entry file has an invalid or missing header.
    #[error("invalid entry header in {path}: {reason}")]
    InvalidHeader {
        /// The entry file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The entry file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// An entry was written by a store with a different version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The entry file path.
        path: PathBuf,
        /// The version of the open store.
        expected: u32,
        /// The version recorded in the entry.
        actual: u32,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The name table is damaged beyond repair.
    #[error("name table {path} is corrupted: {reason}")]
    NameTableCorrupted {
        /// The name table file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A stored index tree refers to a name id the name table does not know.
    #[error("unknown name id {id} in stored index tree")]
    UnknownName {
        /// The dangling id.
        id: u32,
    },

    /// The store was closed while a caller still held it.
    #[error("cache store is closed")]
    Closed,
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CacheError {
        let path = path.into();
        move |source| CacheError::Io { path, source }
    }

    pub(crate) fn serialization(err: impl std::fmt::Display) -> CacheError {
        CacheError::Serialization {
            reason: err.to_string(),
        }
    }
}
