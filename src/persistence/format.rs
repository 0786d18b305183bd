//! On-disk format of trained, shard, and merged index files.
//!
//! # File Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Magic bytes (4B): "SANN"                │
//! │ Format version (4B): u32 LE             │
//! ├─────────────────────────────────────────┤
//! │ Header (postcard):                      │
//! │   - File kind (trained/shard/merged)    │
//! │   - Dimension                           │
//! │   - Vector count                        │
//! │   - Shard number (shards only)          │
//! ├─────────────────────────────────────────┤
//! │ Engine (postcard)                       │
//! ├─────────────────────────────────────────┤
//! │ Footer:                                 │
//! │   - Magic bytes (4B): "SCRC"            │
//! │   - CRC32 (4B) of everything above, LE  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Files are written through [`Directory::atomic_write`], so a crash leaves
//! either the previous file or the new one.

use crate::persistence::directory::Directory;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic bytes at the start of every index file.
pub const INDEX_MAGIC: [u8; 4] = *b"SANN";

/// Magic bytes in front of the CRC32 footer.
pub const CHECKSUM_MAGIC: [u8; 4] = *b"SCRC";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const PREAMBLE_LEN: usize = 8;
const FOOTER_LEN: usize = 8;

/// What an index file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Trained, empty index.
    Trained,
    /// One flushed block.
    Shard,
    /// All shards merged.
    Merged,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Trained => "trained",
            FileKind::Shard => "shard",
            FileKind::Merged => "merged",
        };
        f.write_str(name)
    }
}

/// Header stored in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub kind: FileKind,
    pub dimension: usize,
    pub vector_count: usize,
    pub shard_number: Option<u64>,
}

impl FileHeader {
    pub fn trained(dimension: usize) -> Self {
        Self {
            kind: FileKind::Trained,
            dimension,
            vector_count: 0,
            shard_number: None,
        }
    }

    pub fn shard(dimension: usize, vector_count: usize, shard_number: u64) -> Self {
        Self {
            kind: FileKind::Shard,
            dimension,
            vector_count,
            shard_number: Some(shard_number),
        }
    }

    pub fn merged(dimension: usize, vector_count: usize) -> Self {
        Self {
            kind: FileKind::Merged,
            dimension,
            vector_count,
            shard_number: None,
        }
    }
}

/// Encode `header` and `engine` into a complete file image.
pub fn encode_index<E: Serialize>(header: &FileHeader, engine: &E) -> PersistenceResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(&INDEX_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let bytes = postcard::to_extend(header, bytes)?;
    let mut bytes = postcard::to_extend(engine, bytes)?;

    let crc = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&CHECKSUM_MAGIC);
    bytes.extend_from_slice(&crc.to_le_bytes());
    Ok(bytes)
}

/// Verify the preamble and checksum of a file image, returning the payload.
fn verify(bytes: &[u8]) -> PersistenceResult<&[u8]> {
    if bytes.len() < PREAMBLE_LEN + FOOTER_LEN {
        return Err(PersistenceError::Format(format!(
            "file too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[..4] != INDEX_MAGIC {
        return Err(PersistenceError::Format(format!(
            "invalid magic bytes {:02x?}",
            &bytes[..4]
        )));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..8]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let body_end = bytes.len() - FOOTER_LEN;
    if bytes[body_end..body_end + 4] != CHECKSUM_MAGIC {
        return Err(PersistenceError::Format(
            "missing checksum footer".to_string(),
        ));
    }
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&bytes[body_end + 4..]);
    let expected = u32::from_le_bytes(stored);
    let actual = crc32fast::hash(&bytes[..body_end]);
    if expected != actual {
        return Err(PersistenceError::ChecksumMismatch { expected, actual });
    }

    Ok(&bytes[PREAMBLE_LEN..body_end])
}

fn decode_err(e: postcard::Error) -> PersistenceError {
    PersistenceError::Deserialization(format!("postcard error: {e}"))
}

/// Decode only the header of a file image.
pub fn decode_header(bytes: &[u8]) -> PersistenceResult<FileHeader> {
    let payload = verify(bytes)?;
    let (header, _) = postcard::take_from_bytes::<FileHeader>(payload).map_err(decode_err)?;
    Ok(header)
}

/// Decode a file image, requiring it to be of kind `expected`.
pub fn decode_index<E: DeserializeOwned>(
    bytes: &[u8],
    expected: FileKind,
) -> PersistenceResult<(FileHeader, E)> {
    let payload = verify(bytes)?;
    let (header, rest) = postcard::take_from_bytes::<FileHeader>(payload).map_err(decode_err)?;
    if header.kind != expected {
        return Err(PersistenceError::Format(format!(
            "expected a {expected} index file, found a {} index file",
            header.kind
        )));
    }
    let engine = postcard::from_bytes::<E>(rest).map_err(decode_err)?;
    Ok((header, engine))
}

/// Atomically write an index file at `path`.
pub fn write_index<E: Serialize>(
    directory: &dyn Directory,
    path: &str,
    header: &FileHeader,
    engine: &E,
) -> PersistenceResult<usize> {
    let bytes = encode_index(header, engine)?;
    directory.atomic_write(path, &bytes)?;
    Ok(bytes.len())
}

/// Read the index file at `path`, requiring kind `expected`.
pub fn read_index<E: DeserializeOwned>(
    directory: &dyn Directory,
    path: &str,
    expected: FileKind,
) -> PersistenceResult<(FileHeader, E)> {
    let bytes = directory.read_file(path)?;
    decode_index(&bytes, expected).map_err(|e| annotate(e, path))
}

fn annotate(e: PersistenceError, path: &str) -> PersistenceError {
    match e {
        PersistenceError::Format(msg) => PersistenceError::Format(format!("{path}: {msg}")),
        PersistenceError::Deserialization(msg) => {
            PersistenceError::Deserialization(format!("{path}: {msg}"))
        }
        other => other,
    }
}
