//! Parallel build pipeline.
//!
//! [`build`] turns a directory of grid files into a tile store. Files are
//! distributed over a fixed pool of worker threads through a bounded queue;
//! each worker decodes, splits and stores one whole file at a time and
//! reports a single result per file. The first failed file aborts the
//! build, in which case no index file is written.
//!
//! ```ignore
//! use demtile::BuildConfig;
//!
//! let config = BuildConfig::builder("/data/hgt", "/data/dem.bin")
//!     .overwrite(true)
//!     .build()?;
//! let summary = demtile::build(&config)?;
//! println!("{} tiles, {} bytes", summary.tiles, summary.data_bytes);
//! ```

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, info, warn};

use crate::codec::HIGH_COMPRESSION;
use crate::error::{Result, StorageError};
use crate::filename::parse_cell;
use crate::grid::{read_grid, GridFormat};
use crate::tile::{split_grid, TileGeometry, DEFAULT_SPLIT, SRTM1_SAMPLES};
use crate::writer::StorageWriter;

/// Default worker count: available parallelism plus one.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        + 1
}

/// Settings for one build run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    input_dir: PathBuf,
    output: PathBuf,
    overwrite: bool,
    workers: usize,
    geometry: TileGeometry,
    compression_level: i32,
}

impl BuildConfig {
    /// Create a builder reading grids from `input_dir` into the store at `output`.
    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(input_dir: P, output: Q) -> BuildConfigBuilder {
        BuildConfigBuilder::new(input_dir, output)
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct BuildConfigBuilder {
    input_dir: PathBuf,
    output: PathBuf,
    overwrite: bool,
    workers: Option<usize>,
    grid_samples: usize,
    split: usize,
    compression_level: i32,
}

impl BuildConfigBuilder {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input_dir: P, output: Q) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            overwrite: false,
            workers: None,
            grid_samples: SRTM1_SAMPLES,
            split: DEFAULT_SPLIT,
            compression_level: HIGH_COMPRESSION,
        }
    }

    /// Create a builder from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DEMTILE_INPUT_DIR` | Directory of grid files | Required |
    /// | `DEMTILE_OUTPUT` | Data file path | Required |
    /// | `DEMTILE_OVERWRITE` | `true`/`yes`/`on`/`1` to replace an existing store | false |
    /// | `DEMTILE_WORKERS` | Worker thread count | CPUs + 1 |
    /// | `DEMTILE_SPLIT` | Tiles per cell along each axis | 4 |
    ///
    /// # Errors
    ///
    /// Returns an error if `DEMTILE_INPUT_DIR` or `DEMTILE_OUTPUT` is not set.
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| {
                StorageError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} environment variable not set", name),
                ))
            })
        };
        let input_dir = required("DEMTILE_INPUT_DIR")?;
        let output = required("DEMTILE_OUTPUT")?;

        let mut builder = Self::new(input_dir, output);
        if let Ok(value) = std::env::var("DEMTILE_OVERWRITE") {
            builder.overwrite = is_truthy(&value);
        }
        if let Some(workers) = parse_env("DEMTILE_WORKERS") {
            builder.workers = Some(workers);
        }
        if let Some(split) = parse_env("DEMTILE_SPLIT") {
            builder.split = split;
        }
        Ok(builder)
    }

    /// Replace an existing store instead of refusing to start.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Samples per row/column of every input grid.
    pub fn grid_samples(mut self, grid_samples: usize) -> Self {
        self.grid_samples = grid_samples;
        self
    }

    /// Tiles per cell along each axis.
    pub fn split(mut self, split: usize) -> Self {
        self.split = split;
        self
    }

    /// Take grid samples and split from an existing geometry.
    pub fn geometry(mut self, geometry: TileGeometry) -> Self {
        self.grid_samples = geometry.grid_samples();
        self.split = geometry.split();
        self
    }

    /// LZ4 HC effort level for tile payloads.
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<BuildConfig> {
        let geometry = TileGeometry::new(self.grid_samples, self.split)?;
        Ok(BuildConfig {
            input_dir: self.input_dir,
            output: self.output,
            overwrite: self.overwrite,
            workers: self.workers.unwrap_or_else(default_workers).max(1),
            geometry,
            compression_level: self.compression_level,
        })
    }
}

fn parse_env(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Same truthy spellings the CLI accepts for boolean flags.
fn is_truthy(value: &str) -> bool {
    ["1", "y", "yes", "t", "true", "on"]
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}

/// Outcome of one processed input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    /// Tiles written for this file (0 when skipped).
    pub tiles: usize,
    /// Compressed bytes appended for this file.
    pub compressed_bytes: u64,
    /// The file was a no-op marker.
    pub skipped: bool,
}

/// Progress notifications from [`build_with_progress`].
#[derive(Debug)]
pub enum BuildEvent<'a> {
    /// Input files were enumerated and workers are starting.
    Started { files: usize, workers: usize },
    /// One file finished successfully.
    FileDone(&'a FileReport),
}

/// Totals for a completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Input files processed, including skipped ones.
    pub files: usize,
    /// No-op marker files.
    pub skipped: usize,
    /// Tiles written.
    pub tiles: u64,
    /// Final data file length.
    pub data_bytes: u64,
    pub elapsed: Duration,
}

/// Run a build without progress reporting.
pub fn build(config: &BuildConfig) -> Result<BuildSummary> {
    build_with_progress(config, |_| {})
}

/// Run a build, calling `on_event` from the collecting thread as files complete.
///
/// On the first file error the build stops and the error is returned; the
/// writer is never closed, so no index file exists for the failed run.
pub fn build_with_progress<F>(config: &BuildConfig, mut on_event: F) -> Result<BuildSummary>
where
    F: FnMut(BuildEvent<'_>),
{
    let start = Instant::now();
    let files = list_input_files(config.input_dir())?;

    let writer = StorageWriter::create(config.output(), config.geometry(), config.overwrite())?
        .with_compression_level(config.compression_level());

    info!(
        input = %config.input_dir().display(),
        output = %config.output().display(),
        files = files.len(),
        workers = config.workers(),
        "starting build"
    );
    on_event(BuildEvent::Started {
        files: files.len(),
        workers: config.workers(),
    });

    let mut summary = run_workers(&files, &writer, config, &mut on_event)?;
    writer.close()?;

    summary.elapsed = start.elapsed();
    info!(
        files = summary.files,
        skipped = summary.skipped,
        tiles = summary.tiles,
        data_bytes = summary.data_bytes,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "build complete"
    );
    Ok(summary)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_input_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Feed files to the worker pool and collect exactly one result per file.
fn run_workers<F>(
    files: &[PathBuf],
    writer: &StorageWriter,
    config: &BuildConfig,
    on_event: &mut F,
) -> Result<BuildSummary>
where
    F: FnMut(BuildEvent<'_>),
{
    let workers = config.workers();
    let geometry = config.geometry();
    // Set by whichever thread first sees a failure; nothing is queued,
    // decoded or appended once it is up.
    let abort = AtomicBool::new(false);
    let abort = &abort;

    thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<&Path>(workers);
        let (result_tx, result_rx) = bounded::<Result<FileReport>>(workers);

        scope.spawn(move || {
            for path in files {
                if abort.load(Ordering::Acquire) || job_tx.send(path.as_path()).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for path in job_rx {
                    if abort.load(Ordering::Acquire) {
                        break;
                    }
                    let outcome = match store_file(path, &geometry, writer, abort) {
                        Ok(Some(report)) => Ok(report),
                        Ok(None) => break,
                        Err(e) => {
                            abort.store(true, Ordering::Release);
                            Err(e.in_file(path))
                        }
                    };
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        let result = collect_results(result_rx, files.len(), on_event);
        if result.is_err() {
            abort.store(true, Ordering::Release);
        }
        result
    })
}

/// Consume one result per submitted file, stopping at the first error.
///
/// Returning drops `results`, so a worker still holding a finished report
/// fails its send and exits.
fn collect_results<F>(
    results: Receiver<Result<FileReport>>,
    expected: usize,
    on_event: &mut F,
) -> Result<BuildSummary>
where
    F: FnMut(BuildEvent<'_>),
{
    let mut summary = BuildSummary::default();

    for _ in 0..expected {
        let outcome = results
            .recv()
            .map_err(|_| io::Error::other("worker pool exited before all files were processed"))?;
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "aborting build");
                return Err(e);
            }
        };

        summary.files += 1;
        summary.tiles += report.tiles as u64;
        summary.data_bytes += report.compressed_bytes;
        if report.skipped {
            summary.skipped += 1;
        }
        on_event(BuildEvent::FileDone(&report));
    }

    Ok(summary)
}

/// Decode, split and store one input file.
///
/// The extension is checked first so no-op marker files are skipped
/// regardless of their name; every other file must carry a valid cell name.
pub fn process_file(
    path: &Path,
    geometry: &TileGeometry,
    writer: &StorageWriter,
) -> Result<FileReport> {
    let never = AtomicBool::new(false);
    store_file(path, geometry, writer, &never).map(|report| {
        report.unwrap_or_else(|| FileReport {
            path: path.to_path_buf(),
            tiles: 0,
            compressed_bytes: 0,
            skipped: false,
        })
    })
}

/// Body of [`process_file`]. Returns `Ok(None)` if `abort` is raised before
/// the file is fully stored; tiles already appended stay unreferenced.
fn store_file(
    path: &Path,
    geometry: &TileGeometry,
    writer: &StorageWriter,
    abort: &AtomicBool,
) -> Result<Option<FileReport>> {
    let skipped = || FileReport {
        path: path.to_path_buf(),
        tiles: 0,
        compressed_bytes: 0,
        skipped: true,
    };

    if GridFormat::from_path(path)? == GridFormat::Skip {
        debug!(path = %path.display(), "skipping marker file");
        return Ok(Some(skipped()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let cell = parse_cell(&name)?;

    let Some(grid) = read_grid(path, geometry.grid_samples())? else {
        return Ok(Some(skipped()));
    };
    let tiles = split_grid(cell, &grid, geometry);
    drop(grid);

    let mut compressed_bytes = 0u64;
    for tile in &tiles {
        if abort.load(Ordering::Acquire) {
            debug!(path = %path.display(), "build aborted, dropping remaining tiles");
            return Ok(None);
        }
        compressed_bytes += writer.put(tile)?.length as u64;
    }

    debug!(
        path = %path.display(),
        cell = %cell,
        tiles = tiles.len(),
        compressed_bytes,
        "stored cell"
    );
    Ok(Some(FileReport {
        path: path.to_path_buf(),
        tiles: tiles.len(),
        compressed_bytes,
        skipped: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_defaults() {
        let config = BuildConfig::builder("/in", "/out/dem.bin").build().unwrap();
        assert_eq!(config.input_dir(), Path::new("/in"));
        assert_eq!(config.output(), Path::new("/out/dem.bin"));
        assert!(!config.overwrite());
        assert_eq!(config.workers(), default_workers());
        assert_eq!(config.geometry(), TileGeometry::srtm1());
        assert_eq!(config.compression_level(), HIGH_COMPRESSION);
    }

    #[test]
    fn test_builder_options() {
        let config = BuildConfig::builder("/in", "/out")
            .overwrite(true)
            .workers(3)
            .grid_samples(1201)
            .split(6)
            .compression_level(4)
            .build()
            .unwrap();
        assert!(config.overwrite());
        assert_eq!(config.workers(), 3);
        assert_eq!(config.geometry().tile_samples(), 201);
        assert_eq!(config.compression_level(), 4);

        let config = BuildConfig::builder("/in", "/out")
            .geometry(TileGeometry::srtm3())
            .workers(0)
            .build()
            .unwrap();
        assert_eq!(config.geometry(), TileGeometry::srtm3());
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn test_builder_rejects_bad_geometry() {
        let result = BuildConfig::builder("/in", "/out").split(7).build();
        assert!(matches!(result, Err(StorageError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_from_env() {
        // Single test touches the environment to avoid races between tests
        std::env::remove_var("DEMTILE_INPUT_DIR");
        std::env::remove_var("DEMTILE_OUTPUT");
        assert!(BuildConfigBuilder::from_env().is_err());

        std::env::set_var("DEMTILE_INPUT_DIR", "/srtm");
        std::env::set_var("DEMTILE_OUTPUT", "/store/dem.bin");
        std::env::set_var("DEMTILE_WORKERS", "5");
        std::env::set_var("DEMTILE_SPLIT", "2");
        std::env::set_var("DEMTILE_OVERWRITE", "1");

        let config = BuildConfigBuilder::from_env().unwrap().build().unwrap();
        assert_eq!(config.input_dir(), Path::new("/srtm"));
        assert_eq!(config.output(), Path::new("/store/dem.bin"));
        assert_eq!(config.workers(), 5);
        assert_eq!(config.geometry().split(), 2);
        assert!(config.overwrite());

        for name in [
            "DEMTILE_INPUT_DIR",
            "DEMTILE_OUTPUT",
            "DEMTILE_WORKERS",
            "DEMTILE_SPLIT",
            "DEMTILE_OVERWRITE",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_is_truthy() {
        for value in ["1", "true", "TRUE", "yes", "on", "y"] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["0", "false", "no", "off", "", "maybe"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn test_list_input_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("S10W070.hgt"), b"").unwrap();
        fs::write(dir.path().join("N45E007.hgt"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_input_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["N45E007.hgt", "S10W070.hgt"]);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            list_input_files(dir.path().join("missing")),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn test_process_file_skip_and_bad_name() {
        let dir = TempDir::new().unwrap();
        let geometry = TileGeometry::new(5, 2).unwrap();
        let writer =
            StorageWriter::create(dir.path().join("dem.bin"), geometry, false).unwrap();

        let marker = dir.path().join("N45E007.hgt.xml");
        fs::write(&marker, b"<xml/>").unwrap();
        let report = process_file(&marker, &geometry, &writer).unwrap();
        assert!(report.skipped);
        assert_eq!(report.tiles, 0);

        let bad = dir.path().join("garbage.hgt");
        fs::write(&bad, vec![0u8; 50]).unwrap();
        assert!(matches!(
            process_file(&bad, &geometry, &writer),
            Err(StorageError::InvalidFileName { .. })
        ));

        let good = dir.path().join("N45E007.hgt");
        fs::write(&good, vec![0u8; 50]).unwrap();
        let report = process_file(&good, &geometry, &writer).unwrap();
        assert_eq!(report.tiles, 4);
        assert!(!report.skipped);
        assert!(report.compressed_bytes > 0);
    }
}
