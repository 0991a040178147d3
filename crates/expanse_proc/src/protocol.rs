//! Wire format between the engine and its helper processes.
//!
//! Every message is a frame: a 4-byte little-endian payload length followed
//! by a bincode-encoded value. Requests carry an id; the worker echoes it in
//! the response so that replies to abandoned requests can be discarded.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Upper bound on a single frame, guarding against reading garbage lengths.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// A request sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Request id, unique per worker.
    pub id: u64,
    /// Opaque serialized call, usually an [`ExpansionTask`].
    pub payload: Vec<u8>,
}

/// The worker's answer to a [`RequestFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request being answered.
    pub id: u64,
    /// Outcome reported by the worker.
    pub body: ResponseBody,
}

/// Outcome of a single request as reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Serialized expansion output.
    Ok(Vec<u8>),
    /// The macro failed; the message is shown to the user.
    Err(String),
}

/// The kind of a procedural macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcMacroKind {
    /// `name!(...)`
    FunctionLike,
    /// `#[derive(Name)]`
    Derive,
    /// `#[name(...)]`
    Attribute,
}

impl ProcMacroKind {
    /// Stable tag used when hashing.
    pub fn tag(self) -> u8 {
        match self {
            ProcMacroKind::FunctionLike => 0,
            ProcMacroKind::Derive => 1,
            ProcMacroKind::Attribute => 2,
        }
    }
}

impl std::fmt::Display for ProcMacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcMacroKind::FunctionLike => "function-like",
            ProcMacroKind::Derive => "derive",
            ProcMacroKind::Attribute => "attribute",
        };
        f.write_str(name)
    }
}

/// A single procedural macro invocation, as understood by the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionTask {
    /// Path of the compiled macro library.
    pub library: String,
    /// Name of the macro inside the library.
    pub macro_name: String,
    /// How the macro is invoked.
    pub kind: ProcMacroKind,
    /// Token text of the call body (or of the annotated item).
    pub body: String,
    /// Attribute arguments, for attribute macros.
    pub attributes: Option<String>,
    /// Environment variables visible to the macro.
    pub env: Vec<(String, String)>,
}

impl ExpansionTask {
    /// Serializes the task into a request payload.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        encode(self)
    }

    /// Parses a request payload.
    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Writes one frame and flushes the writer.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
    let bytes = encode(value)?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    decode(&buf).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn task() -> ExpansionTask {
        ExpansionTask {
            library: "/libs/libderive.so".to_string(),
            macro_name: "upper".to_string(),
            kind: ProcMacroKind::FunctionLike,
            body: "foo bar".to_string(),
            attributes: None,
            env: vec![("CARGO_PKG_NAME".to_string(), "demo".to_string())],
        }
    }

    #[test]
    fn frames_are_read_back_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &RequestFrame { id: 1, payload: vec![1, 2] }).unwrap();
        write_frame(&mut buf, &RequestFrame { id: 2, payload: vec![] }).unwrap();

        let mut cursor = Cursor::new(buf);
        let a: RequestFrame = read_frame(&mut cursor).unwrap().unwrap();
        let b: RequestFrame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(a.payload, vec![1, 2]);
        assert_eq!(b.id, 2);
        assert!(read_frame::<_, RequestFrame>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &RequestFrame { id: 9, payload: vec![7; 32] }).unwrap();
        buf.truncate(buf.len() - 5);
        let mut cursor = Cursor::new(buf);
        assert!(read_frame::<_, RequestFrame>(&mut cursor).is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
        buf.extend_from_slice(&[0; 8]);
        let mut cursor = Cursor::new(buf);
        let err = read_frame::<_, RequestFrame>(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn task_payload_decodes() {
        let bytes = task().encode().unwrap();
        assert_eq!(ExpansionTask::decode(&bytes).unwrap(), task());
        assert!(ExpansionTask::decode(b"\xff\xff").is_err());
    }

    #[test]
    fn kind_tags_are_distinct() {
        let tags = [
            ProcMacroKind::FunctionLike.tag(),
            ProcMacroKind::Derive.tag(),
            ProcMacroKind::Attribute.tag(),
        ];
        assert_ne!(tags[0], tags[1]);
        assert_ne!(tags[1], tags[2]);
        assert_eq!(ProcMacroKind::Derive.to_string(), "derive");
    }
}
