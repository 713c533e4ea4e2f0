//! Error types for the tile store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or reading a tile store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error when reading inputs or writing the store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File name does not follow the `{N|S}dd{E|W}ddd.hgt` convention.
    #[error("Invalid file name: {name}")]
    InvalidFileName { name: String },

    /// File extension does not select any known decoding path.
    #[error("Unsupported grid file extension: {extension:?}")]
    UnsupportedFormat { extension: String },

    /// Decoded grid does not hold exactly N×N 16-bit samples.
    #[error("Invalid grid size: {size} bytes (expected {expected})")]
    InvalidGridSize { size: usize, expected: usize },

    /// Grid samples and split factor do not produce whole tiles.
    #[error("Invalid tile geometry: {samples} samples cannot be split into {split} parts")]
    InvalidGeometry { samples: usize, split: usize },

    /// Tile coordinate falls outside the whole-globe index.
    #[error("Tile index out of range: x={x}, y={y}")]
    TileOutOfRange { x: i32, y: i32 },

    /// Compression or decompression of a tile payload failed.
    #[error("Tile codec error: {reason}")]
    Codec { reason: String },

    /// Index blob is truncated or carries an unknown header.
    #[error("Invalid index file: {reason}")]
    InvalidIndex { reason: String },

    /// A thread panicked while holding the writer lock.
    #[error("Storage writer lock poisoned")]
    WriterPoisoned,

    /// Failure while processing one input file.
    #[error("Failed to process {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Wrap this error with the input file that produced it.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        StorageError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias using [`StorageError`].
pub type Result<T> = std::result::Result<T, StorageError>;
