//! The `stub.names` table that stored index trees refer to by id.
//!
//! The file starts with an 8-byte header (magic bytes and format version)
//! followed by one record per name: a little-endian `u32` length, the UTF-8
//! bytes, and a `u32` checksum of those bytes. Record `n` holds the name with
//! id `n`. Names are only ever appended.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use expanse_common::{ContentHash, Ident, Interner};
use parking_lot::Mutex;

use crate::error::CacheError;

const NAMES_MAGIC: [u8; 4] = *b"EXNM";
const NAMES_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// What [`NameTable::open`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTableStatus {
    /// There was no table; an empty one was created.
    Created,
    /// The table was intact.
    Loaded,
    /// The table was damaged and has been cut back to its valid records.
    /// Ids handed out before the damage may now be missing.
    Repaired {
        /// Number of names that survived the repair.
        kept: usize,
    },
}

impl NameTableStatus {
    /// Returns `true` unless an intact table was loaded, i.e. if ids stored
    /// elsewhere may no longer resolve to the names they were created for.
    pub fn invalidates_ids(self) -> bool {
        !matches!(self, NameTableStatus::Loaded)
    }
}

struct State {
    interner: Interner,
    /// Names interned since the last flush, in id order.
    pending: Vec<String>,
}

/// A persistent, append-only string table.
pub struct NameTable {
    path: PathBuf,
    state: Mutex<State>,
}

impl std::fmt::Debug for NameTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameTable")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

/// Result of scanning a table file.
struct Scan {
    names: Vec<String>,
    valid_len: usize,
    damaged: bool,
}

fn checksum(bytes: &[u8]) -> u32 {
    let hash = ContentHash::from_bytes(bytes);
    let b = hash.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn header() -> [u8; HEADER_LEN] {
    let mut out = [0; HEADER_LEN];
    out[..4].copy_from_slice(&NAMES_MAGIC);
    out[4..].copy_from_slice(&NAMES_FORMAT_VERSION.to_le_bytes());
    out
}

fn encode_record(name: &str, out: &mut Vec<u8>) {
    let bytes = name.as_bytes();
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(&checksum(bytes).to_le_bytes());
}

fn read_u32(raw: &[u8], at: usize) -> Option<u32> {
    let bytes = raw.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decodes the record at `pos`, returning the name and the next position.
fn read_record(raw: &[u8], pos: usize) -> Option<(String, usize)> {
    let len = read_u32(raw, pos)? as usize;
    let start = pos + 4;
    let end = start.checked_add(len)?;
    let bytes = raw.get(start..end)?;
    if read_u32(raw, end)? != checksum(bytes) {
        return None;
    }
    let name = std::str::from_utf8(bytes).ok()?;
    Some((name.to_string(), end + 4))
}

/// Reads records until the first damaged one. Assumes a valid header.
fn scan_records(raw: &[u8]) -> Scan {
    let mut names: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut pos = HEADER_LEN;
    while pos < raw.len() {
        let record = read_record(raw, pos);
        match record {
            // A duplicate would shift every later id.
            Some((name, next)) if seen.insert(name.clone()) => {
                names.push(name);
                pos = next;
            }
            _ => {
                return Scan {
                    names,
                    valid_len: pos,
                    damaged: true,
                };
            }
        }
    }
    Scan {
        names,
        valid_len: pos,
        damaged: false,
    }
}

impl NameTable {
    /// Opens the table at `path`, creating it if absent and repairing it if
    /// damaged.
    ///
    /// A damaged tail is truncated away. A file whose header is unreadable
    /// is replaced by an empty table. Fails only if the file cannot be read
    /// or rewritten.
    pub fn open(path: &Path) -> Result<(NameTable, NameTableStatus), CacheError> {
        let raw = match fs::read(path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let (names, status) = match raw {
            None => {
                Self::write_empty(path)?;
                (Vec::new(), NameTableStatus::Created)
            }
            Some(raw) if raw.len() < HEADER_LEN || raw[..HEADER_LEN] != header() => {
                tracing::debug!(path = %path.display(), "name table header is damaged, recreating");
                Self::write_empty(path)?;
                (Vec::new(), NameTableStatus::Repaired { kept: 0 })
            }
            Some(raw) => {
                let scan = scan_records(&raw);
                if scan.damaged {
                    tracing::debug!(
                        path = %path.display(),
                        kept = scan.names.len(),
                        dropped_bytes = raw.len() - scan.valid_len,
                        "repairing name table"
                    );
                    Self::truncate(path, scan.valid_len)?;
                    let kept = scan.names.len();
                    (scan.names, NameTableStatus::Repaired { kept })
                } else {
                    (scan.names, NameTableStatus::Loaded)
                }
            }
        };

        let interner = Interner::new();
        for (index, name) in names.iter().enumerate() {
            let id = interner.get_or_intern(name);
            if id.as_raw() as usize != index {
                return Err(CacheError::NameTableCorrupted {
                    path: path.to_path_buf(),
                    reason: format!("name `{name}` does not have id {index}"),
                });
            }
        }

        let table = NameTable {
            path: path.to_path_buf(),
            state: Mutex::new(State {
                interner,
                pending: Vec::new(),
            }),
        };
        Ok((table, status))
    }

    fn write_empty(path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }
        fs::write(path, header()).map_err(CacheError::io(path))
    }

    fn truncate(path: &Path, len: usize) -> Result<(), CacheError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(CacheError::io(path))?;
        file.set_len(len as u64).map_err(CacheError::io(path))?;
        file.sync_all().map_err(CacheError::io(path))
    }

    /// The id of `name`, assigning the next free id if it is new.
    pub fn intern(&self, name: &str) -> Ident {
        let mut state = self.state.lock();
        if let Some(id) = state.interner.get(name) {
            return id;
        }
        let id = state.interner.get_or_intern(name);
        state.pending.push(name.to_string());
        id
    }

    /// The name with id `id`, if any.
    pub fn resolve(&self, id: Ident) -> Option<String> {
        self.state.lock().interner.try_resolve(id).map(str::to_string)
    }

    /// Number of names, including ones not yet flushed.
    pub fn len(&self) -> usize {
        self.state.lock().interner.len()
    }

    /// Returns `true` if the table holds no names.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends names interned since the last flush to the file.
    pub fn flush(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for name in &state.pending {
            encode_record(name, &mut buf);
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(CacheError::io(&self.path))?;
        file.write_all(&buf).map_err(CacheError::io(&self.path))?;
        file.sync_data().map_err(CacheError::io(&self.path))?;
        state.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("stub.names")
    }

    #[test]
    fn create_intern_flush_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir);
        let (table, status) = NameTable::open(&path).unwrap();
        assert_eq!(status, NameTableStatus::Created);
        let foo = table.intern("foo");
        let bar = table.intern("bar");
        assert_eq!(table.intern("foo"), foo);
        assert_ne!(foo, bar);
        table.flush().unwrap();

        let (table, status) = NameTable::open(&path).unwrap();
        assert_eq!(status, NameTableStatus::Loaded);
        assert_eq!(table.resolve(foo).as_deref(), Some("foo"));
        assert_eq!(table.resolve(bar).as_deref(), Some("bar"));
        assert_eq!(table.intern("bar"), bar);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unflushed_names_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir);
        let (table, _) = NameTable::open(&path).unwrap();
        let id = table.intern("ephemeral");
        drop(table);
        let (table, _) = NameTable::open(&path).unwrap();
        assert_eq!(table.resolve(id), None);
        assert!(table.is_empty());
    }

    #[test]
    fn damaged_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir);
        let (table, _) = NameTable::open(&path).unwrap();
        let a = table.intern("alpha");
        table.intern("beta");
        table.flush().unwrap();

        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, &raw).unwrap();

        let (table, status) = NameTable::open(&path).unwrap();
        assert_eq!(status, NameTableStatus::Repaired { kept: 1 });
        assert!(status.invalidates_ids());
        assert_eq!(table.resolve(a).as_deref(), Some("alpha"));
        assert_eq!(table.len(), 1);

        let (_, status) = NameTable::open(&path).unwrap();
        assert_eq!(status, NameTableStatus::Loaded);
    }

    #[test]
    fn damaged_header_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir);
        fs::write(&path, b"not a name table").unwrap();
        let (table, status) = NameTable::open(&path).unwrap();
        assert_eq!(status, NameTableStatus::Repaired { kept: 0 });
        assert!(table.is_empty());
        assert_eq!(fs::read(&path).unwrap(), header());
    }

    #[test]
    fn appends_after_reload_keep_ids_dense() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir);
        let (table, _) = NameTable::open(&path).unwrap();
        table.intern("a");
        table.flush().unwrap();
        let (table, _) = NameTable::open(&path).unwrap();
        let b = table.intern("b");
        assert_eq!(b.as_raw(), 1);
        table.flush().unwrap();
        let (table, _) = NameTable::open(&path).unwrap();
        assert_eq!(table.resolve(Ident::from_raw(1)).as_deref(), Some("b"));
    }

    #[test]
    fn loaded_status_keeps_ids() {
        assert!(!NameTableStatus::Loaded.invalidates_ids());
        assert!(NameTableStatus::Created.invalidates_ids());
    }
}
