use anyhow::{Context, Result};
use demtile::writer::index_path;
use demtile::StorageReader;
use serde::Serialize;
use std::path::PathBuf;

use super::format_size;

#[derive(Serialize)]
struct StoreInfo {
    split: usize,
    tile_samples: usize,
    tiles: u64,
    payload_bytes: u64,
    data_bytes: u64,
    index_bytes: u64,
    compression_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    extent: Option<[i32; 4]>,
}

pub fn run(store: PathBuf, json: bool) -> Result<()> {
    let reader = StorageReader::open(&store)
        .with_context(|| format!("Failed to open tile store {}", store.display()))?;

    let stats = reader.stats();
    let t = reader.tile_samples();
    let index_bytes = std::fs::metadata(index_path(&store))?.len();

    // Bounding box of present tiles in tile coordinates
    let extent = reader.tiles().fold(None, |acc: Option<[i32; 4]>, c| {
        Some(match acc {
            None => [c.x, c.y, c.x, c.y],
            Some([min_x, min_y, max_x, max_y]) => {
                [min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y)]
            }
        })
    });

    let info = StoreInfo {
        split: reader.split(),
        tile_samples: t,
        tiles: stats.tiles,
        payload_bytes: stats.payload_bytes,
        data_bytes: stats.data_bytes,
        index_bytes,
        compression_ratio: stats.compression_ratio(t * t * 2),
        extent,
    };

    if json {
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    println!("Store: {}", store.display());
    println!();
    println!(
        "Split: {} ({}x{} samples per tile)",
        info.split, info.tile_samples, info.tile_samples
    );
    println!("Tiles: {}", info.tiles);
    if let Some([min_x, min_y, max_x, max_y]) = info.extent {
        let split = info.split as f64;
        println!(
            "Coverage: lat {:.2} to {:.2}, lon {:.2} to {:.2}",
            min_y as f64 / split,
            (max_y + 1) as f64 / split,
            min_x as f64 / split,
            (max_x + 1) as f64 / split
        );
    }
    println!("Data size: {}", format_size(info.data_bytes));
    println!("Index size: {}", format_size(info.index_bytes));
    if info.tiles > 0 {
        println!("Compression: {:.1}%", info.compression_ratio * 100.0);
    }
    if info.payload_bytes != info.data_bytes {
        println!(
            "Unreferenced data: {}",
            format_size(info.data_bytes.saturating_sub(info.payload_bytes))
        );
    }

    Ok(())
}
