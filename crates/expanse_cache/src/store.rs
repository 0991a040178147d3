//! Versioned, content-addressed persistent maps.
//!
//! A [`PersistentMap`] stores one file per key under
//! `<dir>/<first two hex digits>/<hex key>.bin`. Every entry carries a binary
//! header with magic bytes, the entry format version, the store version, the
//! key, and a checksum of the payload. Entries are written to a temporary
//! file and renamed into place, so readers never observe a partial write and
//! writing the same value twice is indistinguishable from writing it once.

use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use expanse_common::ContentHash;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::meta::{StoreMeta, STORE_META_FILE};

/// Magic bytes identifying an entry file.
const ENTRY_MAGIC: [u8; 4] = *b"EXPN";

/// Entry header format version. Independent of the store version, which
/// describes the payload.
const ENTRY_FORMAT_VERSION: u32 = 1;

/// Extension of entry files.
const ENTRY_EXT: &str = "bin";

/// Number of unsynced entries after which `put` syncs them itself.
pub const DIRTY_FLUSH_THRESHOLD: usize = 1024;

/// Header prepended to every entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryHeader {
    magic: [u8; 4],
    format_version: u32,
    store_version: u32,
    key: ContentHash,
    checksum: ContentHash,
}

/// A persistent map from [`ContentHash`] to values of type `V`.
///
/// Reads and writes are safe from any number of threads. Writers of
/// different keys never contend; writers of the same key race and the last
/// rename wins.
pub struct PersistentMap<V> {
    dir: PathBuf,
    version: u32,
    dirty: Mutex<Vec<PathBuf>>,
    closed: AtomicBool,
    _value: PhantomData<fn() -> V>,
}

impl<V> std::fmt::Debug for PersistentMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentMap")
            .field("dir", &self.dir)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<V: Serialize + DeserializeOwned> PersistentMap<V> {
    /// Opens the store in `dir`, wiping it first if it was created with
    /// another version or its metadata is unreadable.
    pub fn open_clean_or_reset_broken(dir: &Path, version: u32) -> Result<Self, CacheError> {
        match StoreMeta::load(dir) {
            Some(meta) if meta.is_compatible(version) => {
                tracing::debug!(dir = %dir.display(), version, "opened persistent map");
            }
            found => {
                if dir.exists() {
                    tracing::debug!(
                        dir = %dir.display(),
                        found = ?found.map(|m| m.version),
                        expected = version,
                        "persistent map is stale or broken, wiping"
                    );
                    fs::remove_dir_all(dir).map_err(CacheError::io(dir))?;
                }
                StoreMeta::new(version).save(dir)?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            version,
            dirty: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            _value: PhantomData,
        })
    }

    /// Reads the value stored under `key`.
    ///
    /// A missing entry is `Ok(None)`. A damaged or foreign entry is an
    /// error: the store can no longer be trusted.
    pub fn get(&self, key: &ContentHash) -> Result<Option<V>, CacheError> {
        self.ensure_open()?;
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let payload = self.validate_entry(&path, key, &raw)?;
        let (value, _) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(CacheError::serialization)?;
        Ok(Some(value))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &ContentHash, value: &V) -> Result<(), CacheError> {
        self.ensure_open()?;
        let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(CacheError::serialization)?;
        let bytes = self.encode_entry(key, &payload)?;

        let shard = self.shard_dir(key);
        fs::create_dir_all(&shard).map_err(CacheError::io(&shard))?;
        let path = self.entry_path(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&shard).map_err(CacheError::io(&shard))?;
        tmp.write_all(&bytes).map_err(CacheError::io(tmp.path()))?;
        tmp.persist(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        let full = {
            let mut dirty = self.dirty.lock();
            dirty.push(path);
            dirty.len() >= DIRTY_FLUSH_THRESHOLD
        };
        if full {
            self.flush()?;
        }
        Ok(())
    }
}

impl<V> PersistentMap<V> {
    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The version the store was opened with.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns `true` if an entry exists for `key`. Does not validate it.
    pub fn contains(&self, key: &ContentHash) -> bool {
        self.entry_path(key).is_file()
    }

    /// Counts the entries on disk.
    pub fn len(&self) -> Result<usize, CacheError> {
        let mut count = 0;
        let shards = fs::read_dir(&self.dir).map_err(CacheError::io(&self.dir))?;
        for shard in shards {
            let shard = shard.map_err(CacheError::io(&self.dir))?.path();
            if !shard.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&shard).map_err(CacheError::io(&shard))?;
            for entry in entries {
                let path = entry.map_err(CacheError::io(&shard))?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Forces every entry written since the last flush to disk.
    pub fn flush(&self) -> Result<(), CacheError> {
        let dirty = std::mem::take(&mut *self.dirty.lock());
        for path in dirty {
            match fs::File::open(&path) {
                Ok(file) => file.sync_all().map_err(CacheError::io(&path))?,
                // Replaced by a concurrent writer, which records its own path.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(())
    }

    /// Flushes and closes the store. Later reads and writes fail with
    /// [`CacheError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.flush()
    }

    /// Number of entries written since the last flush.
    pub fn unflushed(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Path of the entry file for `key`.
    pub fn entry_path(&self, key: &ContentHash) -> PathBuf {
        let hex = key.to_string();
        self.shard_dir(key).join(format!("{hex}.{ENTRY_EXT}"))
    }

    fn shard_dir(&self, key: &ContentHash) -> PathBuf {
        self.dir.join(format!("{:02x}", key.as_bytes()[0]))
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    /// Layout: 4-byte header length (little-endian), header, payload.
    fn encode_entry(&self, key: &ContentHash, payload: &[u8]) -> Result<Vec<u8>, CacheError> {
        let header = EntryHeader {
            magic: ENTRY_MAGIC,
            format_version: ENTRY_FORMAT_VERSION,
            store_version: self.version,
            key: *key,
            checksum: ContentHash::from_bytes(payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(CacheError::serialization)?;
        let header_len =
            u32::try_from(header_bytes.len()).map_err(CacheError::serialization)?;

        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        Ok(output)
    }

    fn validate_entry<'a>(
        &self,
        path: &Path,
        key: &ContentHash,
        raw: &'a [u8],
    ) -> Result<&'a [u8], CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let Some((len_bytes, rest)) = raw.split_first_chunk::<4>() else {
            return Err(invalid("truncated header length"));
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(invalid("truncated header"));
        }
        let (header_bytes, payload) = rest.split_at(header_len);
        let (header, _): (EntryHeader, usize) =
            bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != ENTRY_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != ENTRY_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: ENTRY_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.store_version != self.version {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: self.version,
                actual: header.store_version,
            });
        }
        if header.key != *key {
            return Err(invalid("entry belongs to another key"));
        }
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(payload)
    }
}

/// Returns `true` if `dir` looks like a store directory.
pub fn is_store_dir(dir: &Path) -> bool {
    dir.join(STORE_META_FILE).is_file()
}
