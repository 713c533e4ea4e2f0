use anyhow::{Context, Result};
use demtile::build::list_input_files;
use demtile::{parse_cell, GridFormat};
use std::fs;
use std::path::PathBuf;

use super::format_size;

pub fn run(dir: PathBuf) -> Result<()> {
    if !dir.exists() {
        anyhow::bail!("Input directory does not exist: {}", dir.display());
    }

    let files = list_input_files(&dir).context("Failed to read input directory")?;

    if files.is_empty() {
        println!("No files found in: {}", dir.display());
        return Ok(());
    }

    let mut grid_count = 0;
    let mut skip_count = 0;
    let mut invalid_count = 0;
    let mut total_size: u64 = 0;

    println!("{:<24} {:>8} {:>10} {:>12}", "FILE", "FORMAT", "CELL", "SIZE");
    println!("{}", "-".repeat(57));

    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        total_size += size;

        let (format, cell) = match GridFormat::from_path(path) {
            Ok(GridFormat::Skip) => {
                skip_count += 1;
                ("skip", "-".to_string())
            }
            Ok(format) => match parse_cell(&filename) {
                Ok(cell) => {
                    grid_count += 1;
                    (format.label(), cell.to_string())
                }
                Err(_) => {
                    invalid_count += 1;
                    (format.label(), "???".to_string())
                }
            },
            Err(_) => {
                invalid_count += 1;
                ("???", "-".to_string())
            }
        };

        println!(
            "{:<24} {:>8} {:>10} {:>12}",
            filename,
            format,
            cell,
            format_size(size)
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Grid files: {}", grid_count);
    if skip_count > 0 {
        println!("  Skipped markers: {}", skip_count);
    }
    if invalid_count > 0 {
        println!("  Invalid (build will fail): {}", invalid_count);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Input directory: {}", dir.display());

    Ok(())
}
