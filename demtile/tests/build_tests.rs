//! End-to-end tests for the build pipeline.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use demtile::writer::index_path;
use demtile::{
    build, build_with_progress, BuildConfig, BuildEvent, GeodeticCell, StorageError,
    StorageIndex, StorageReader, TileCoord,
};
use tempfile::TempDir;

/// Small grids keep the tests fast: 13 samples split 3 ways gives 5×5 tiles.
const SAMPLES: usize = 13;
const SPLIT: usize = 3;
const TILE: usize = 5;

/// Elevation at a global sample position (counted from the south-west).
fn elevation(global_col: i64, global_row: i64) -> i16 {
    ((global_col * 7 + global_row * 3).rem_euclid(3000) - 500) as i16
}

/// Big-endian grid bytes for a cell, continuous across cell borders.
fn grid_bytes(cell: GeodeticCell) -> Vec<u8> {
    let n = SAMPLES as i64;
    let mut data = Vec::with_capacity(SAMPLES * SAMPLES * 2);
    for row in 0..n {
        for col in 0..n {
            let global_col = cell.lon as i64 * (n - 1) + col;
            let global_row = cell.lat as i64 * (n - 1) + (n - 1 - row);
            data.extend_from_slice(&elevation(global_col, global_row).to_be_bytes());
        }
    }
    data
}

fn create_grid(dir: &Path, cell: GeodeticCell) -> PathBuf {
    let path = dir.join(cell.filename());
    fs::write(&path, grid_bytes(cell)).unwrap();
    path
}

fn config(input: &Path, output: &Path) -> BuildConfig {
    BuildConfig::builder(input, output)
        .grid_samples(SAMPLES)
        .split(SPLIT)
        .workers(3)
        .build()
        .unwrap()
}

fn expected_coords(cell: GeodeticCell) -> Vec<TileCoord> {
    let s = SPLIT as i32;
    (0..s)
        .flat_map(|dy| (0..s).map(move |dx| TileCoord::new(cell.lon * s + dx, cell.lat * s + dy)))
        .collect()
}

#[test]
fn test_build_two_adjacent_cells() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    let cells = [GeodeticCell::new(45, 7), GeodeticCell::new(45, 8)];
    for cell in cells {
        create_grid(input.path(), cell);
    }

    let summary = build(&config(input.path(), &output)).unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.tiles, 18);

    let index = StorageIndex::from_bytes(&fs::read(index_path(&output)).unwrap()).unwrap();
    let mut total = 0;
    for cell in cells {
        for coord in expected_coords(cell) {
            let record = index.get(coord).unwrap().expect("tile present");
            assert!(record.length > 0, "tile {coord} has a nonzero record");
            total += record.length;
        }
    }
    assert_eq!(index.present().count(), 18);

    let data_len = fs::metadata(&output).unwrap().len();
    assert_eq!(data_len as i64, total);
    assert_eq!(summary.data_bytes, data_len);
}

#[test]
fn test_tiles_read_back_with_shared_edges() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    create_grid(input.path(), GeodeticCell::new(-1, -1));
    create_grid(input.path(), GeodeticCell::new(-1, 0));
    build(&config(input.path(), &output)).unwrap();

    let reader = StorageReader::open(&output).unwrap();
    assert_eq!(reader.split(), SPLIT);
    assert_eq!(reader.tile_samples(), TILE);
    assert_eq!(reader.tiles().count(), 18);

    for coord in reader.tiles() {
        let samples = reader.tile(coord).unwrap().unwrap();
        for row in 0..TILE {
            for col in 0..TILE {
                let expected = elevation(
                    coord.x as i64 * (TILE as i64 - 1) + col as i64,
                    coord.y as i64 * (TILE as i64 - 1) + row as i64,
                );
                assert_eq!(samples[row * TILE + col], expected, "tile {coord} ({row}, {col})");
            }
        }
    }

    // Tile x=-1 (east edge of cell lon=-1) meets tile x=0 (west edge of cell lon=0)
    let west = reader.tile(TileCoord::new(-1, -2)).unwrap().unwrap();
    let east = reader.tile(TileCoord::new(0, -2)).unwrap().unwrap();
    for row in 0..TILE {
        assert_eq!(west[row * TILE + TILE - 1], east[row * TILE]);
    }
}

#[test]
fn test_wrong_size_file_aborts_without_index() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    create_grid(input.path(), GeodeticCell::new(45, 7));
    create_grid(input.path(), GeodeticCell::new(45, 8));
    fs::write(input.path().join("N45E009.hgt"), vec![0u8; 100]).unwrap();

    let err = build(&config(input.path(), &output)).unwrap_err();
    match err {
        StorageError::File { path, source } => {
            assert!(path.ends_with("N45E009.hgt"));
            assert!(matches!(
                *source,
                StorageError::InvalidGridSize { size: 100, .. }
            ));
        }
        other => panic!("Expected File error, got {other:?}"),
    }
    assert!(!index_path(&output).exists(), "failed builds leave no index");
}

#[test]
fn test_abort_stops_before_later_files() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    // Sorts first, so it is the first job handed out
    fs::write(input.path().join("N00E000.hgt"), vec![0u8; 10]).unwrap();
    for lon in 1..20 {
        create_grid(input.path(), GeodeticCell::new(0, lon));
    }

    let config = BuildConfig::builder(input.path(), &output)
        .grid_samples(SAMPLES)
        .split(SPLIT)
        .workers(1)
        .build()
        .unwrap();

    let err = build(&config).unwrap_err();
    assert!(err.to_string().contains("N00E000.hgt"));
    assert_eq!(
        fs::metadata(&output).unwrap().len(),
        0,
        "no file after the failing one is stored"
    );
    assert!(!index_path(&output).exists());
}

#[test]
fn test_bad_file_name_aborts() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    create_grid(input.path(), GeodeticCell::new(10, 10));
    fs::write(input.path().join("garbage.hgt"), grid_bytes(GeodeticCell::new(0, 0))).unwrap();

    let err = build(&config(input.path(), &output)).unwrap_err();
    assert!(err.to_string().contains("garbage.hgt"));
    assert!(!index_path(&output).exists());
}

#[test]
fn test_unsupported_extension_aborts() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    fs::write(input.path().join("N10E010.tif"), b"tiff").unwrap();

    let err = build(&config(input.path(), &output)).unwrap_err();
    match err {
        StorageError::File { source, .. } => {
            assert!(matches!(*source, StorageError::UnsupportedFormat { .. }))
        }
        other => panic!("Expected File error, got {other:?}"),
    }
}

#[test]
fn test_mixed_formats_and_marker_files() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    create_grid(input.path(), GeodeticCell::new(0, 0));

    let gz_cell = GeodeticCell::new(0, 1);
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(input.path().join(format!("{}.gz", gz_cell.filename()))).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(&grid_bytes(gz_cell)).unwrap();
    encoder.finish().unwrap();

    fs::write(input.path().join("N00E000.hgt.xml"), b"<metadata/>").unwrap();
    fs::write(input.path().join("readme.xml"), b"<notes/>").unwrap();

    let summary = build(&config(input.path(), &output)).unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.tiles, 18);

    let reader = StorageReader::open(&output).unwrap();
    for coord in expected_coords(gz_cell) {
        assert!(reader.record(coord).unwrap().is_some());
    }
}

#[test]
fn test_progress_events() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    let cells: Vec<_> = (0..12).map(|i| GeodeticCell::new(i / 4, i % 4 - 2)).collect();
    for &cell in &cells {
        create_grid(input.path(), cell);
    }

    let mut started = None;
    let mut done = Vec::new();
    let summary = build_with_progress(&config(input.path(), &output), |event| match event {
        BuildEvent::Started { files, workers } => started = Some((files, workers)),
        BuildEvent::FileDone(report) => done.push(report.path.clone()),
    })
    .unwrap();

    assert_eq!(started, Some((12, 3)));
    assert_eq!(done.len(), 12);
    done.sort();
    done.dedup();
    assert_eq!(done.len(), 12, "one result per file");
    assert_eq!(summary.tiles, 12 * 9);
}

#[test]
fn test_existing_output_requires_overwrite() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    create_grid(input.path(), GeodeticCell::new(45, 7));
    build(&config(input.path(), &output)).unwrap();

    assert!(matches!(
        build(&config(input.path(), &output)),
        Err(StorageError::Io(_))
    ));

    let overwrite = BuildConfig::builder(input.path(), &output)
        .grid_samples(SAMPLES)
        .split(SPLIT)
        .overwrite(true)
        .build()
        .unwrap();
    let summary = build(&overwrite).unwrap();
    assert_eq!(summary.tiles, 9);
    assert_eq!(fs::metadata(&output).unwrap().len(), summary.data_bytes);
}

#[test]
fn test_empty_input_dir() {
    let input = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("dem.bin");

    let summary = build(&config(input.path(), &output)).unwrap();
    assert_eq!(summary.files, 0);
    assert_eq!(StorageReader::open(&output).unwrap().tiles().count(), 0);
}
