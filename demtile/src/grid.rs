//! Elevation grid decoding.
//!
//! This module provides [`read_grid`] for loading one SRTM cell from disk,
//! uncompressed or inside a gzip, bzip2 or ZIP container.
//!
//! # Byte Order
//!
//! `.hgt` files store each sample as a 16-bit **big-endian** signed integer,
//! rows running north to south. [`RawGrid`] holds the same samples in
//! **little-endian** order, which is the order tile payloads are stored in.
//! The swap happens once, eagerly, when the grid is loaded.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Result, StorageError};

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// Container format of an input grid file, selected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    /// Uncompressed `.hgt` file
    Raw,
    /// Gzip compression (`.hgt.gz`)
    Gzip,
    /// Bzip2 compression (`.hgt.bz2`)
    Bzip2,
    /// ZIP archive holding one `.hgt` entry (`.hgt.zip`)
    Zip,
    /// Metadata sidecar (`.xml`). Decodes to nothing.
    Skip,
}

impl GridFormat {
    /// Detect the format from the final extension of a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use demtile::grid::GridFormat;
    ///
    /// assert_eq!(GridFormat::from_path("N45E007.hgt").unwrap(), GridFormat::Raw);
    /// assert_eq!(GridFormat::from_path("N45E007.HGT.GZ").unwrap(), GridFormat::Gzip);
    /// assert_eq!(GridFormat::from_path("N45E007.hgt.xml").unwrap(), GridFormat::Skip);
    /// assert!(GridFormat::from_path("N45E007.tif").is_err());
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "hgt" => Ok(GridFormat::Raw),
            "gz" => Ok(GridFormat::Gzip),
            "bz2" => Ok(GridFormat::Bzip2),
            "zip" => Ok(GridFormat::Zip),
            "xml" => Ok(GridFormat::Skip),
            _ => Err(StorageError::UnsupportedFormat { extension }),
        }
    }

    /// Short label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            GridFormat::Raw => "hgt",
            GridFormat::Gzip => "gzip",
            GridFormat::Bzip2 => "bzip2",
            GridFormat::Zip => "zip",
            GridFormat::Skip => "skip",
        }
    }
}

/// Square matrix of N×N elevation samples in little-endian byte order.
///
/// Row 0 is the northern edge, column 0 the western edge.
#[derive(Debug, Clone)]
pub struct RawGrid {
    /// Number of samples per row/column
    samples: usize,
    /// N×N×2 bytes, little-endian i16 samples, row-major
    data: Vec<u8>,
}

impl RawGrid {
    /// Build a grid from bytes in source (big-endian) order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidGridSize`] unless `data` holds exactly
    /// `samples × samples × 2` bytes.
    pub fn from_source_bytes(mut data: Vec<u8>, samples: usize) -> Result<Self> {
        let expected = grid_byte_len(samples);
        if data.len() != expected {
            return Err(StorageError::InvalidGridSize {
                size: data.len(),
                expected,
            });
        }

        for sample in data.chunks_exact_mut(2) {
            sample.swap(0, 1);
        }

        Ok(Self { samples, data })
    }

    /// Returns the number of samples per row/column.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Raw sample bytes in little-endian order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Sample at a row/column index (row 0 = north edge).
    pub fn sample(&self, row: usize, col: usize) -> i16 {
        let offset = (row * self.samples + col) * 2;
        i16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }
}

/// Byte length of an N×N grid of 16-bit samples.
pub fn grid_byte_len(samples: usize) -> usize {
    samples * samples * 2
}

/// Load and validate one grid file.
///
/// Returns `Ok(None)` for [`GridFormat::Skip`] files: the file is
/// intentionally ignored and produces no tiles.
///
/// # Errors
///
/// Returns an error if:
/// - The extension is not recognized
/// - The file cannot be read or decompressed
/// - The decoded size is not exactly `samples × samples × 2` bytes
pub fn read_grid<P: AsRef<Path>>(path: P, samples: usize) -> Result<Option<RawGrid>> {
    let path = path.as_ref();
    let format = GridFormat::from_path(path)?;
    let mut data = Vec::with_capacity(grid_byte_len(samples));

    match format {
        GridFormat::Skip => return Ok(None),
        GridFormat::Raw => {
            BufReader::new(File::open(path)?).read_to_end(&mut data)?;
        }
        GridFormat::Gzip => {
            GzDecoder::new(BufReader::new(File::open(path)?)).read_to_end(&mut data)?;
        }
        GridFormat::Bzip2 => {
            BzDecoder::new(BufReader::new(File::open(path)?)).read_to_end(&mut data)?;
        }
        GridFormat::Zip => read_hgt_from_zip(File::open(path)?, &mut data)?,
    }

    debug!(path = %path.display(), format = format.label(), bytes = data.len(), "decoded grid");
    RawGrid::from_source_bytes(data, samples).map(Some)
}

/// Decode the first `.hgt` entry of a ZIP archive.
fn read_hgt_from_zip(file: File, out: &mut Vec<u8>) -> Result<()> {
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(io::Error::other)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        if entry.name().to_lowercase().ends_with(".hgt") {
            entry.read_to_end(out)?;
            return Ok(());
        }
    }

    Err(io::Error::new(io::ErrorKind::NotFound, "no .hgt entry in ZIP archive").into())
}
