//! # demtile - SRTM Tile Store Builder
//!
//! Converts directories of SRTM (Shuttle Radar Topography Mission) `.hgt`
//! grids into a compressed, randomly addressable tile store: one data file
//! of LZ4-compressed tiles and one dense whole-globe index.
//!
//! ## Features
//!
//! - **Parallel**: Files are decoded, split and compressed on a worker pool
//! - **Compact**: Tiles are stored with high-effort LZ4 HC compression
//! - **O(1) lookup**: The index addresses every tile on the globe directly
//! - **Flexible input**: Raw `.hgt`, `.hgt.gz`, `.hgt.bz2` and `.hgt.zip`
//!
//! ## Quick Start
//!
//! ```ignore
//! use demtile::{BuildConfig, StorageReader, TileCoord};
//!
//! let config = BuildConfig::builder("/data/hgt", "/data/dem.bin").build()?;
//! demtile::build(&config)?;
//!
//! let reader = StorageReader::open("/data/dem.bin")?;
//! let samples = reader.tile(TileCoord::new(28, 180))?;
//! ```
//!
//! ## Store Layout
//!
//! - `<output>`: concatenated compressed tile payloads, no framing
//! - `<output>.idx`: header plus `(offset, length)` per tile, see [`index`]
//!
//! Each cell of N×N samples is split into S×S tiles of `(N-1)/S + 1` samples
//! per side; neighbouring tiles share their edge samples. See [`tile`].

pub mod build;
pub mod codec;
pub mod error;
pub mod filename;
pub mod grid;
pub mod index;
pub mod reader;
pub mod tile;
pub mod writer;

// Re-export main types at crate root for convenience
pub use build::{
    build, build_with_progress, BuildConfig, BuildConfigBuilder, BuildEvent, BuildSummary,
    FileReport,
};
pub use error::{Result, StorageError};
pub use filename::{parse_cell, GeodeticCell};
pub use grid::{read_grid, GridFormat, RawGrid, VOID_VALUE};
pub use index::{IndexRecord, StorageIndex};
pub use reader::{StorageReader, StoreStats};
pub use tile::{split_grid, Tile, TileCoord, TileGeometry};
pub use writer::StorageWriter;
