//! Tile payload compression.
//!
//! Payloads are stored as raw LZ4 blocks without a size prefix; the
//! uncompressed size is always the geometry's tile byte length.

use lz4::block::{self, CompressionMode};

use crate::error::{Result, StorageError};

/// Highest LZ4 HC effort level, used for offline builds.
pub const HIGH_COMPRESSION: i32 = 12;

/// Compress a raw tile payload with LZ4 HC at `level`.
///
/// Output is deterministic for a given payload and level.
pub fn compress(payload: &[u8], level: i32) -> Result<Vec<u8>> {
    block::compress(payload, Some(CompressionMode::HIGHCOMPRESSION(level)), false).map_err(|e| {
        StorageError::Codec {
            reason: format!("LZ4 compression failed: {}", e),
        }
    })
}

/// Decompress a payload that must expand to exactly `expected_size` bytes.
pub fn decompress(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let size = i32::try_from(expected_size).map_err(|_| StorageError::Codec {
        reason: format!("payload size {} exceeds LZ4 block limit", expected_size),
    })?;

    let payload = block::decompress(compressed, Some(size)).map_err(|e| StorageError::Codec {
        reason: format!("LZ4 decompression failed: {}", e),
    })?;

    if payload.len() != expected_size {
        return Err(StorageError::Codec {
            reason: format!(
                "decompressed {} bytes, expected {}",
                payload.len(),
                expected_size
            ),
        });
    }
    Ok(payload)
}
