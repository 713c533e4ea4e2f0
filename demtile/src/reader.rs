//! Read-back access to a finished tile store.
//!
//! [`StorageReader`] memory-maps the data file and loads the full index. It
//! exists for inspection and verification of built stores.

use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use crate::codec;
use crate::error::{Result, StorageError};
use crate::index::{IndexRecord, StorageIndex};
use crate::tile::TileCoord;
use crate::writer::index_path;

/// Summary of a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of tiles with a record in the index.
    pub tiles: u64,
    /// Sum of all compressed payload lengths.
    pub payload_bytes: u64,
    /// Length of the data file.
    pub data_bytes: u64,
}

impl StoreStats {
    /// Compressed size relative to raw tile payloads (0.0 to 1.0).
    pub fn compression_ratio(&self, tile_bytes: usize) -> f64 {
        let raw = self.tiles * tile_bytes as u64;
        if raw == 0 {
            0.0
        } else {
            self.payload_bytes as f64 / raw as f64
        }
    }
}

/// A memory-mapped, read-only tile store.
pub struct StorageReader {
    /// Memory-mapped data file; `None` when the data file is empty
    data: Option<Mmap>,
    index: StorageIndex,
}

impl StorageReader {
    /// Open the data file at `path` and its `<path>.idx` index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let index = StorageIndex::from_bytes(&fs::read(index_path(&path))?)?;

        let file = File::open(&path)?;
        let data = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: Memory mapping is safe as long as the file is not modified
            // while mapped. Finished stores are never written again.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self { data, index })
    }

    /// Split factor the store was built with.
    pub fn split(&self) -> usize {
        self.index.bounds().split()
    }

    /// Samples per row/column of each tile.
    pub fn tile_samples(&self) -> usize {
        self.index.tile_samples()
    }

    fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Index record for a tile, `None` if the tile is absent.
    pub fn record(&self, coord: TileCoord) -> Result<Option<IndexRecord>> {
        self.index.get(coord)
    }

    /// Decompressed samples of a tile, `None` if the tile is absent.
    ///
    /// Samples are row-major with row 0 at the tile's southern edge.
    pub fn tile(&self, coord: TileCoord) -> Result<Option<Vec<i16>>> {
        let Some(record) = self.record(coord)? else {
            return Ok(None);
        };

        let data = self.data();
        let start = usize::try_from(record.offset).ok();
        let end = start.and_then(|s| s.checked_add(usize::try_from(record.length).ok()?));
        let compressed = match (start, end) {
            (Some(start), Some(end)) if end <= data.len() => &data[start..end],
            _ => {
                return Err(StorageError::InvalidIndex {
                    reason: format!(
                        "record for tile {} points past end of data file ({}+{} > {})",
                        coord,
                        record.offset,
                        record.length,
                        data.len()
                    ),
                })
            }
        };

        let t = self.tile_samples();
        let payload = codec::decompress(compressed, t * t * 2)?;
        Ok(Some(
            payload
                .chunks_exact(2)
                .map(|s| i16::from_le_bytes([s[0], s[1]]))
                .collect(),
        ))
    }

    /// Coordinates of every present tile.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.index.present().map(|(coord, _)| coord)
    }

    pub fn stats(&self) -> StoreStats {
        let (tiles, payload_bytes) = self
            .index
            .present()
            .fold((0u64, 0u64), |(n, bytes), (_, r)| (n + 1, bytes + r.length as u64));
        StoreStats {
            tiles,
            payload_bytes,
            data_bytes: self.data().len() as u64,
        }
    }
}
