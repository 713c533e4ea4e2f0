use anyhow::{Context, Result};
use demtile::writer::index_path;
use demtile::{build_with_progress, BuildConfig, BuildEvent};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;

use super::format_size;

#[derive(Serialize)]
struct BuildReport {
    data_file: PathBuf,
    index_file: PathBuf,
    files: usize,
    skipped: usize,
    tiles: u64,
    data_bytes: u64,
    elapsed_ms: u64,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    input: PathBuf,
    output: PathBuf,
    overwrite: bool,
    workers: Option<usize>,
    samples: usize,
    split: usize,
    level: i32,
    json: bool,
) -> Result<()> {
    let mut builder = BuildConfig::builder(&input, &output)
        .overwrite(overwrite)
        .grid_samples(samples)
        .split(split)
        .compression_level(level);

    if let Some(workers) = workers {
        builder = builder.workers(workers);
    }

    let config = builder.build().context("Invalid build configuration")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );

    let summary = build_with_progress(&config, |event| match event {
        BuildEvent::Started { files, .. } => pb.set_length(files as u64),
        BuildEvent::FileDone(report) => {
            if let Some(name) = report.path.file_name() {
                pb.set_message(name.to_string_lossy().into_owned());
            }
            pb.inc(1);
        }
    })
    .inspect_err(|_| pb.abandon())
    .with_context(|| format!("Failed to build tile store from {}", input.display()))?;

    pb.finish_with_message("done");

    let report = BuildReport {
        index_file: index_path(&output),
        data_file: output,
        files: summary.files,
        skipped: summary.skipped,
        tiles: summary.tiles,
        data_bytes: summary.data_bytes,
        elapsed_ms: summary.elapsed.as_millis() as u64,
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("Data file: {}", report.data_file.display());
        println!("Index file: {}", report.index_file.display());
        println!();
        println!(
            "Files: {} ({} skipped)",
            report.files, report.skipped
        );
        println!("Tiles: {}", report.tiles);
        println!("Data size: {}", format_size(report.data_bytes));
        println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    }

    Ok(())
}
