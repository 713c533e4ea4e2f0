//! Tile geometry and grid splitting.
//!
//! A grid cell of N×N samples is split into S×S tiles of T×T samples, where
//! `T = (N - 1) / S + 1`. Adjacent tiles share one row or column of samples,
//! so every tile edge matches its neighbour bit-for-bit.
//!
//! # Tile Coordinates
//!
//! Tiles are addressed in split-grid space: `X = lon·S + dx`, `Y = lat·S + dy`,
//! where `(dx, dy)` is the tile position inside its cell counted from the
//! southwest corner. X grows eastward and Y grows northward.
//!
//! # Payload Layout
//!
//! A tile payload is `T × T` little-endian i16 samples, row-major. Payload
//! row 0 is the **southern** edge of the tile and rows advance northward;
//! columns run west to east.

use std::fmt;

use crate::error::{Result, StorageError};
use crate::filename::GeodeticCell;
use crate::grid::RawGrid;

/// Samples per row/column for SRTM1 (1 arc-second, ~30m resolution)
pub const SRTM1_SAMPLES: usize = 3601;

/// Samples per row/column for SRTM3 (3 arc-second, ~90m resolution)
pub const SRTM3_SAMPLES: usize = 1201;

/// Default number of tiles per cell along each axis.
pub const DEFAULT_SPLIT: usize = 4;

/// Grid and tile dimensions shared by every cell of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    grid_samples: usize,
    split: usize,
}

impl TileGeometry {
    /// Create a geometry for grids of `grid_samples` per side split into
    /// `split` parts per axis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidGeometry`] unless `split >= 1`,
    /// `grid_samples >= 2` and `grid_samples - 1` is divisible by `split`.
    pub fn new(grid_samples: usize, split: usize) -> Result<Self> {
        let valid = split >= 1
            && grid_samples >= 2
            && (grid_samples - 1) % split == 0
            && split
                .checked_mul(360)
                .and_then(|cols| i32::try_from(cols).ok())
                .is_some();
        if !valid {
            return Err(StorageError::InvalidGeometry {
                samples: grid_samples,
                split,
            });
        }
        Ok(Self {
            grid_samples,
            split,
        })
    }

    /// SRTM1 grids (3601 × 3601) with the default split.
    pub fn srtm1() -> Self {
        Self {
            grid_samples: SRTM1_SAMPLES,
            split: DEFAULT_SPLIT,
        }
    }

    /// SRTM3 grids (1201 × 1201) with the default split.
    pub fn srtm3() -> Self {
        Self {
            grid_samples: SRTM3_SAMPLES,
            split: DEFAULT_SPLIT,
        }
    }

    /// Samples per row/column of an input grid (N).
    pub fn grid_samples(&self) -> usize {
        self.grid_samples
    }

    /// Tiles per cell along each axis (S).
    pub fn split(&self) -> usize {
        self.split
    }

    /// Samples per row/column of a tile (T).
    pub fn tile_samples(&self) -> usize {
        (self.grid_samples - 1) / self.split + 1
    }

    /// Byte length of an uncompressed tile payload.
    pub fn tile_bytes(&self) -> usize {
        self.tile_samples() * self.tile_samples() * 2
    }

    /// Number of tiles produced from one cell.
    pub fn tiles_per_cell(&self) -> usize {
        self.split * self.split
    }
}

impl Default for TileGeometry {
    fn default() -> Self {
        Self::srtm1()
    }
}

/// Global tile position in split-grid space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Coordinate of tile `(dx, dy)` inside `cell`.
    pub fn in_cell(cell: GeodeticCell, dx: usize, dy: usize, split: usize) -> Self {
        let split = split as i32;
        Self {
            x: cell.lon * split + dx as i32,
            y: cell.lat * split + dy as i32,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One tile ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub coord: TileCoord,
    /// T×T little-endian i16 samples, southern row first
    pub data: Vec<u8>,
}

impl Tile {
    /// Sample at a payload row/column (row 0 = south edge).
    pub fn sample(&self, tile_samples: usize, row: usize, col: usize) -> i16 {
        let offset = (row * tile_samples + col) * 2;
        i16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }
}

/// Split one cell's grid into `S²` tiles.
///
/// Tiles are returned in row-major order of `(dx, dy)`: index `dy·S + dx`.
///
/// # Panics
///
/// Panics if the grid does not match the geometry or a row copy transfers
/// anything other than `T·2` bytes. Both indicate a defect in the reader or
/// splitter, not bad input.
pub fn split_grid(cell: GeodeticCell, grid: &RawGrid, geometry: &TileGeometry) -> Vec<Tile> {
    let n = geometry.grid_samples();
    let s = geometry.split();
    let t = geometry.tile_samples();
    let row_bytes = t * 2;

    assert_eq!(
        grid.samples(),
        n,
        "grid has {} samples per row, geometry expects {}",
        grid.samples(),
        n
    );
    let bytes = grid.as_bytes();

    let mut tiles = Vec::with_capacity(geometry.tiles_per_cell());
    for dy in 0..s {
        for dx in 0..s {
            let mut data = vec![0u8; geometry.tile_bytes()];

            for (row, dst) in data.chunks_exact_mut(row_bytes).enumerate() {
                let grid_row = n - 1 - dy * (t - 1) - row;
                let start = ((grid_row * n) + dx * (t - 1)) * 2;
                let end = (start + row_bytes).min(bytes.len());
                let src = &bytes[start.min(end)..end];
                assert_eq!(
                    src.len(),
                    row_bytes,
                    "tile row copy transferred {} bytes, expected {}",
                    src.len(),
                    row_bytes
                );
                dst.copy_from_slice(src);
            }

            tiles.push(Tile {
                coord: TileCoord::in_cell(cell, dx, dy, s),
                data,
            });
        }
    }
    tiles
}
