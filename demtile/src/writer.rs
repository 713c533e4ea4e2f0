//! Append-only tile store writer.
//!
//! [`StorageWriter`] owns the data file and the in-memory [`StorageIndex`].
//! Any number of threads may call [`StorageWriter::put`] concurrently:
//! compression runs in the calling thread without holding any lock, and only
//! the append plus index update is serialized.
//!
//! The index file is produced once, by [`StorageWriter::close`]. A build that
//! never reaches `close` leaves no index behind.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::codec::{self, HIGH_COMPRESSION};
use crate::error::{Result, StorageError};
use crate::index::{IndexBounds, IndexRecord, StorageIndex};
use crate::tile::{Tile, TileGeometry};

/// Path of the index file that accompanies a data file (`<data>.idx`).
pub fn index_path<P: AsRef<Path>>(data_path: P) -> PathBuf {
    let mut name = OsString::from(data_path.as_ref().as_os_str());
    name.push(".idx");
    PathBuf::from(name)
}

/// State guarded by the writer lock.
struct WriterState {
    data: BufWriter<File>,
    /// Current end of the data file
    end: u64,
    index: StorageIndex,
}

/// Concurrent writer for a data file and its index.
///
/// # Example
///
/// ```ignore
/// use demtile::{StorageWriter, TileGeometry};
///
/// let writer = StorageWriter::create("/data/dem.bin", TileGeometry::srtm1(), false)?;
/// for tile in tiles {
///     writer.put(&tile)?;
/// }
/// writer.close()?; // writes /data/dem.bin.idx
/// ```
pub struct StorageWriter {
    data_path: PathBuf,
    index_path: PathBuf,
    bounds: IndexBounds,
    tile_bytes: usize,
    compression_level: i32,
    state: Mutex<WriterState>,
}

impl StorageWriter {
    /// Create the data file for a new store.
    ///
    /// Without `overwrite`, fails if the data file or its index already
    /// exists. With `overwrite`, the data file is truncated and any existing
    /// index is removed so it can never be paired with new data.
    pub fn create<P: AsRef<Path>>(path: P, geometry: TileGeometry, overwrite: bool) -> Result<Self> {
        let data_path = path.as_ref().to_path_buf();
        let index_path = index_path(&data_path);

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
            match fs::remove_file(&index_path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        } else {
            if index_path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("index file already exists: {}", index_path.display()),
                )
                .into());
            }
            options.create_new(true);
        }
        let data = options.open(&data_path)?;

        debug!(
            path = %data_path.display(),
            split = geometry.split(),
            tile_samples = geometry.tile_samples(),
            overwrite,
            "opened storage writer"
        );

        Ok(Self {
            data_path,
            index_path,
            bounds: IndexBounds::new(geometry.split()),
            tile_bytes: geometry.tile_bytes(),
            compression_level: HIGH_COMPRESSION,
            state: Mutex::new(WriterState {
                data: BufWriter::new(data),
                end: 0,
                index: StorageIndex::new(geometry.split(), geometry.tile_samples()),
            }),
        })
    }

    /// Override the LZ4 HC effort level (default [`HIGH_COMPRESSION`]).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Compress a tile, append it to the data file and record it in the index.
    ///
    /// Out-of-range coordinates fail with [`StorageError::TileOutOfRange`]
    /// and payloads of the wrong size with [`StorageError::Codec`], both
    /// before anything is written.
    pub fn put(&self, tile: &Tile) -> Result<IndexRecord> {
        let position = self.bounds.position(tile.coord)?;
        if tile.data.len() != self.tile_bytes {
            return Err(StorageError::Codec {
                reason: format!(
                    "tile {} payload is {} bytes, expected {}",
                    tile.coord,
                    tile.data.len(),
                    self.tile_bytes
                ),
            });
        }
        let compressed = codec::compress(&tile.data, self.compression_level)?;

        let mut state = self.state.lock().map_err(|_| StorageError::WriterPoisoned)?;
        let record = IndexRecord::new(state.end as i64, compressed.len() as i64);
        state.data.write_all(&compressed)?;
        state.end += compressed.len() as u64;
        state.index.set_at(position, record);

        Ok(record)
    }

    /// Flush the data file and write the complete index in a single write.
    ///
    /// The index is written to a temporary file and renamed into place, so
    /// readers only ever see a complete index. No `put` may be issued once
    /// `close` has begun.
    pub fn close(self) -> Result<()> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| StorageError::WriterPoisoned)?;

        let data = state.data.into_inner().map_err(|e| e.into_error())?;
        data.sync_all()?;

        let mut tmp_name = OsString::from(self.index_path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        state.index.write_to(&file)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.index_path)?;

        debug!(
            path = %self.index_path.display(),
            data_bytes = state.end,
            tiles = state.index.present().count(),
            "wrote storage index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoord;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn geometry() -> TileGeometry {
        TileGeometry::new(9, 2).unwrap()
    }

    fn make_tile(x: i32, y: i32) -> Tile {
        let g = geometry();
        let data = (0..g.tile_bytes() / 2)
            .flat_map(|i| ((i as i32 * x - y) as i16).to_le_bytes())
            .collect();
        Tile {
            coord: TileCoord::new(x, y),
            data,
        }
    }

    fn read_index(path: &Path) -> StorageIndex {
        StorageIndex::from_bytes(&fs::read(index_path(path)).unwrap()).unwrap()
    }

    #[test]
    fn test_index_path() {
        assert_eq!(
            index_path("/data/dem.bin"),
            PathBuf::from("/data/dem.bin.idx")
        );
    }

    #[test]
    fn test_put_and_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        let writer = StorageWriter::create(&path, geometry(), false).unwrap();

        let first = writer.put(&make_tile(14, 90)).unwrap();
        let second = writer.put(&make_tile(15, 90)).unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, first.length);

        assert!(!index_path(&path).exists(), "index only appears on close");
        writer.close().unwrap();

        let index = read_index(&path);
        assert_eq!(index.get(TileCoord::new(14, 90)).unwrap(), Some(first));
        assert_eq!(index.get(TileCoord::new(15, 90)).unwrap(), Some(second));
        assert_eq!(index.get(TileCoord::new(16, 90)).unwrap(), None);

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len() as i64, first.length + second.length);

        let payload = codec::decompress(
            &data[second.offset as usize..(second.offset + second.length) as usize],
            geometry().tile_bytes(),
        )
        .unwrap();
        assert_eq!(payload, make_tile(15, 90).data);
    }

    #[test]
    fn test_put_out_of_range_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        let writer = StorageWriter::create(&path, geometry(), false).unwrap();

        // split 2: x must be in [-360, 360)
        let err = writer.put(&make_tile(360, 0)).unwrap_err();
        assert!(matches!(err, StorageError::TileOutOfRange { x: 360, y: 0 }));
        let err = writer.put(&make_tile(0, -181)).unwrap_err();
        assert!(matches!(err, StorageError::TileOutOfRange { .. }));

        writer.close().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(read_index(&path).present().count(), 0);
    }

    #[test]
    fn test_put_wrong_payload_size_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        let writer = StorageWriter::create(&path, geometry(), false).unwrap();

        let mut tile = make_tile(3, 4);
        tile.data.truncate(tile.data.len() - 2);
        let err = writer.put(&tile).unwrap_err();
        assert!(matches!(err, StorageError::Codec { .. }));
        assert!(err.to_string().contains("expected 50"));

        writer.close().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(read_index(&path).get(TileCoord::new(3, 4)).unwrap(), None);
    }

    #[test]
    fn test_concurrent_puts_do_not_overlap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        let writer = Arc::new(StorageWriter::create(&path, geometry(), false).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    (0..16)
                        .map(|i| writer.put(&make_tile(t * 16 + i, t - 4)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut records: Vec<IndexRecord> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        Arc::into_inner(writer).unwrap().close().unwrap();

        records.sort_by_key(|r| r.offset);
        let mut expected_offset = 0;
        for record in &records {
            assert_eq!(record.offset, expected_offset, "ranges are contiguous");
            expected_offset += record.length;
        }

        let total: i64 = records.iter().map(|r| r.length).sum();
        assert_eq!(fs::metadata(&path).unwrap().len() as i64, total);
        assert_eq!(read_index(&path).present().count(), 128);
    }

    #[test]
    fn test_refuses_existing_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        fs::write(&path, b"old").unwrap();

        assert!(matches!(
            StorageWriter::create(&path, geometry(), false),
            Err(StorageError::Io(_))
        ));

        fs::remove_file(&path).unwrap();
        fs::write(index_path(&path), b"old").unwrap();
        assert!(StorageWriter::create(&path, geometry(), false).is_err());
    }

    #[test]
    fn test_overwrite_truncates_and_drops_stale_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.bin");
        fs::write(&path, vec![1u8; 4096]).unwrap();
        fs::write(index_path(&path), b"stale").unwrap();

        let writer = StorageWriter::create(&path, geometry(), true).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(!index_path(&path).exists());

        writer.put(&make_tile(0, 0)).unwrap();
        writer.close().unwrap();
        assert_eq!(read_index(&path).present().count(), 1);
    }
}
