//! Dense whole-globe tile index.
//!
//! The index holds one [`IndexRecord`] per possible tile coordinate, in a
//! `(360·S) × (180·S)` table. Signed tile coordinates are shifted into array
//! positions with `ax = X + 180·S` and `ay = Y + 90·S`.
//!
//! # File Format
//!
//! All integers are little-endian.
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 8    | magic `DEMTIDX1`                        |
//! | 8      | 4    | split factor S (u32)                    |
//! | 12     | 4    | tile samples T (u32)                    |
//! | 16     | 16·W·H | records, x-major: `ax·H + ay`         |
//!
//! Each record is `offset: i64` followed by `length: i64`. A record with
//! zero length means the tile is **absent**; it never denotes an empty tile
//! at offset zero.

use std::io::Write;

use crate::error::{Result, StorageError};
use crate::tile::TileCoord;

/// Magic bytes at the start of every index file.
pub const INDEX_MAGIC: &[u8; 8] = b"DEMTIDX1";

/// Header length in bytes.
pub const HEADER_LEN: usize = 16;

/// Serialized length of one record.
pub const RECORD_LEN: usize = 16;

/// Location of a compressed tile payload inside the data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub offset: i64,
    pub length: i64,
}

impl IndexRecord {
    pub fn new(offset: i64, length: i64) -> Self {
        Self { offset, length }
    }

    /// Zero records mark tiles that were never written.
    pub fn is_absent(&self) -> bool {
        self.length == 0
    }
}

/// Dimensions of the index for a split factor, with coordinate mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBounds {
    split: usize,
}

impl IndexBounds {
    pub fn new(split: usize) -> Self {
        Self { split }
    }

    pub fn split(&self) -> usize {
        self.split
    }

    /// Number of columns (X positions) covering 360°.
    pub fn width(&self) -> usize {
        360 * self.split
    }

    /// Number of rows (Y positions) covering 180°.
    pub fn height(&self) -> usize {
        180 * self.split
    }

    /// Total number of records in the table.
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat table position of a tile coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TileOutOfRange`] unless the shifted
    /// coordinates satisfy `0 <= ax < width` and `0 <= ay < height`.
    pub fn position(&self, coord: TileCoord) -> Result<usize> {
        let ax = i64::from(coord.x) + 180 * self.split as i64;
        let ay = i64::from(coord.y) + 90 * self.split as i64;

        if ax < 0 || ay < 0 || ax >= self.width() as i64 || ay >= self.height() as i64 {
            return Err(StorageError::TileOutOfRange {
                x: coord.x,
                y: coord.y,
            });
        }
        Ok(ax as usize * self.height() + ay as usize)
    }

    /// Tile coordinate stored at a flat table position.
    pub fn coord_at(&self, position: usize) -> TileCoord {
        let ax = (position / self.height()) as i64;
        let ay = (position % self.height()) as i64;
        TileCoord::new(
            (ax - 180 * self.split as i64) as i32,
            (ay - 90 * self.split as i64) as i32,
        )
    }
}

/// In-memory index table.
#[derive(Debug, Clone)]
pub struct StorageIndex {
    bounds: IndexBounds,
    tile_samples: usize,
    records: Vec<IndexRecord>,
}

impl StorageIndex {
    /// Create an index with every tile absent.
    pub fn new(split: usize, tile_samples: usize) -> Self {
        let bounds = IndexBounds::new(split);
        Self {
            bounds,
            tile_samples,
            records: vec![IndexRecord::default(); bounds.len()],
        }
    }

    pub fn bounds(&self) -> IndexBounds {
        self.bounds
    }

    pub fn tile_samples(&self) -> usize {
        self.tile_samples
    }

    /// Store the record for a tile coordinate.
    pub fn set(&mut self, coord: TileCoord, record: IndexRecord) -> Result<()> {
        let position = self.bounds.position(coord)?;
        self.set_at(position, record);
        Ok(())
    }

    /// Store a record at a position already validated by [`IndexBounds::position`].
    pub(crate) fn set_at(&mut self, position: usize, record: IndexRecord) {
        self.records[position] = record;
    }

    /// Record for a tile, or `None` if the tile is absent.
    pub fn get(&self, coord: TileCoord) -> Result<Option<IndexRecord>> {
        let record = self.records[self.bounds.position(coord)?];
        Ok((!record.is_absent()).then_some(record))
    }

    /// Iterate over present tiles in table order.
    pub fn present(&self) -> impl Iterator<Item = (TileCoord, IndexRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_absent())
            .map(|(i, r)| (self.bounds.coord_at(i), *r))
    }

    /// Serialized length of the whole index.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.records.len() * RECORD_LEN
    }

    /// Write the header and full table.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&(self.bounds.split() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.tile_samples as u32).to_le_bytes());
        for record in &self.records {
            buf.extend_from_slice(&record.offset.to_le_bytes());
            buf.extend_from_slice(&record.length.to_le_bytes());
        }
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Parse an index blob produced by [`StorageIndex::write_to`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN || &data[..8] != INDEX_MAGIC {
            return Err(StorageError::InvalidIndex {
                reason: "missing DEMTIDX1 header".to_string(),
            });
        }

        let split = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let tile_samples = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;
        if split == 0 || tile_samples < 2 {
            return Err(StorageError::InvalidIndex {
                reason: format!("bad header: split={}, tile_samples={}", split, tile_samples),
            });
        }

        let bounds = IndexBounds::new(split);
        let body = &data[HEADER_LEN..];
        let expected = split
            .checked_mul(split)
            .and_then(|n| n.checked_mul(360 * 180 * RECORD_LEN))
            .filter(|&len| len == body.len());
        if expected.is_none() {
            return Err(StorageError::InvalidIndex {
                reason: format!(
                    "{} record bytes do not match split {}",
                    body.len(),
                    split
                ),
            });
        }

        let records = body
            .chunks_exact(RECORD_LEN)
            .map(|chunk| {
                let (offset, length) = chunk.split_at(8);
                IndexRecord::new(
                    i64::from_le_bytes(offset.try_into().unwrap_or_default()),
                    i64::from_le_bytes(length.try_into().unwrap_or_default()),
                )
            })
            .collect();

        Ok(Self {
            bounds,
            tile_samples,
            records,
        })
    }
}
