//! Grid file name decoding.
//!
//! SRTM grid files follow the naming convention `{N|S}{lat}{E|W}{lon}.hgt`,
//! optionally followed by a container extension (`N45E007.hgt.gz`).
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N35, S12)
//! - Longitude: 3 digits with E/W prefix (e.g., E138, W077)
//!
//! The name identifies the **southwest corner** of the 1° × 1° cell.

use std::fmt;

use crate::error::{Result, StorageError};

/// Length of the `N00E000` cell prefix.
const CELL_NAME_LEN: usize = 7;

/// Marker that must immediately follow the cell prefix.
const HGT_MARKER: &str = ".HGT";

/// Integer-degree cell identifying one input grid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeodeticCell {
    /// Latitude of the southwest corner, negative in the southern hemisphere.
    pub lat: i32,
    /// Longitude of the southwest corner, negative in the western hemisphere.
    pub lon: i32,
}

impl GeodeticCell {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Canonical `.hgt` file name for this cell.
    ///
    /// # Examples
    ///
    /// ```
    /// use demtile::filename::GeodeticCell;
    ///
    /// assert_eq!(GeodeticCell::new(45, 7).filename(), "N45E007.hgt");
    /// assert_eq!(GeodeticCell::new(-10, -70).filename(), "S10W070.hgt");
    /// ```
    pub fn filename(&self) -> String {
        format!("{}.hgt", self)
    }
}

impl fmt::Display for GeodeticCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat_prefix = if self.lat >= 0 { 'N' } else { 'S' };
        let lon_prefix = if self.lon >= 0 { 'E' } else { 'W' };
        write!(
            f,
            "{}{:02}{}{:03}",
            lat_prefix,
            self.lat.abs(),
            lon_prefix,
            self.lon.abs()
        )
    }
}

/// Decode a grid file name into its cell.
///
/// Matching is case-insensitive and ignores any leading directory. The cell
/// prefix must sit directly before a `.hgt` marker; when the name carries
/// several markers the first one preceded by a valid cell wins.
///
/// # Errors
///
/// Returns [`StorageError::InvalidFileName`] if the pattern does not match.
///
/// # Examples
///
/// ```
/// use demtile::filename::{parse_cell, GeodeticCell};
///
/// assert_eq!(parse_cell("N45E007.HGT").unwrap(), GeodeticCell::new(45, 7));
/// assert_eq!(parse_cell("s10w070.hgt").unwrap(), GeodeticCell::new(-10, -70));
/// assert!(parse_cell("garbage.hgt").is_err());
/// ```
pub fn parse_cell(filename: &str) -> Result<GeodeticCell> {
    parse_cell_opt(filename).ok_or_else(|| StorageError::InvalidFileName {
        name: filename.to_string(),
    })
}

fn parse_cell_opt(filename: &str) -> Option<GeodeticCell> {
    // Extract just the filename if a path is given
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .to_ascii_uppercase();

    name.match_indices(HGT_MARKER)
        .find_map(|(end, _)| decode_prefix(name.as_bytes(), end))
}

/// Decode the seven bytes ending at `end` as `{N,S}dd{E,W}ddd`.
fn decode_prefix(name: &[u8], end: usize) -> Option<GeodeticCell> {
    let start = end.checked_sub(CELL_NAME_LEN)?;
    let b = &name[start..end];

    let lat_sign = match b[0] {
        b'N' => 1,
        b'S' => -1,
        _ => return None,
    };
    let lat = parse_digits(&b[1..3])?;

    let lon_sign = match b[3] {
        b'E' => 1,
        b'W' => -1,
        _ => return None,
    };
    let lon = parse_digits(&b[4..7])?;

    Some(GeodeticCell::new(lat * lat_sign, lon * lon_sign))
}

fn parse_digits(digits: &[u8]) -> Option<i32> {
    digits.iter().try_fold(0i32, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + i32::from(d - b'0'))
    })
}
