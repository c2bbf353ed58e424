//! Framing for snapshot files.
//!
//! A snapshot file is a header followed by one frame:
//!
//! ```text
//! [magic: "KYKG"][header version: 1 byte]
//! [frame version: 1 byte][length: 4 bytes LE][JSON: N bytes][crc32: 4 bytes LE]
//! ```

use std::io::{ErrorKind, Read, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::storage::StorageError;

const CODEC_VERSION: u8 = 1;

/// Magic bytes at the start of every kyrokg snapshot file.
pub const MAGIC: [u8; 4] = *b"KYKG";

fn io_err(context: &str, err: &std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::UnexpectedEof {
        StorageError::Corrupted(format!("{context}: truncated file"))
    } else {
        StorageError::BackendError(format!("{context}: {err}"))
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes `value` into one checksummed frame no larger than `max_len`
/// bytes of payload.
///
/// # Errors
/// Returns `SerializationError` if the value cannot be encoded or is too large.
pub fn encode<T: Serialize>(value: &T, max_len: u32) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value).map_err(|e| StorageError::SerializationError(e.to_string()))?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|&len| len <= max_len)
        .ok_or_else(|| {
            StorageError::SerializationError(format!(
                "snapshot of {} bytes exceeds the limit of {max_len}",
                data.len()
            ))
        })?;

    let mut out = Vec::with_capacity(data.len() + 9);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads one frame and deserializes it, verifying the checksum.
///
/// # Errors
/// - `Corrupted` for an unknown version, an oversized or truncated frame, or
///   a checksum mismatch
/// - `SerializationError` if the payload does not deserialize
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read, max_len: u32) -> Result<T, StorageError> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version).map_err(|e| io_err("frame version", &e))?;
    if version[0] != CODEC_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported frame version {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).map_err(|e| io_err("frame length", &e))?;
    let len = u32::from_le_bytes(len_bytes);
    if len > max_len {
        return Err(StorageError::Corrupted(format!(
            "frame of {len} bytes exceeds the limit of {max_len}"
        )));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).map_err(|e| io_err("frame data", &e))?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes).map_err(|e| io_err("frame checksum", &e))?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(StorageError::Corrupted(format!(
            "checksum mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| StorageError::SerializationError(e.to_string()))
}

/// Writes the file header.
///
/// # Errors
/// Returns `BackendError` on IO failure.
pub fn write_header(writer: &mut impl Write) -> Result<(), StorageError> {
    writer
        .write_all(&MAGIC)
        .and_then(|()| writer.write_all(&[CODEC_VERSION]))
        .map_err(|e| io_err("header", &e))
}

/// Reads and checks the file header.
///
/// # Errors
/// Returns `Corrupted` if the magic bytes or version do not match.
pub fn read_header(reader: &mut impl Read) -> Result<(), StorageError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|e| io_err("header", &e))?;
    if magic != MAGIC {
        return Err(StorageError::Corrupted(format!(
            "not a kyrokg snapshot (magic {magic:?})"
        )));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version).map_err(|e| io_err("header", &e))?;
    if version[0] != CODEC_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported snapshot version {}",
            version[0]
        )));
    }
    Ok(())
}
