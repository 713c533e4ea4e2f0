use anyhow::{bail, Context, Result};
use demtile::{StorageReader, TileCoord, VOID_VALUE};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct TileResponse {
    x: i32,
    y: i32,
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    elevation: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    void_samples: Option<usize>,
}

pub fn run(
    store: PathBuf,
    x: i32,
    y: i32,
    row: Option<usize>,
    col: Option<usize>,
    json: bool,
) -> Result<()> {
    let reader = StorageReader::open(&store)
        .with_context(|| format!("Failed to open tile store {}", store.display()))?;

    let coord = TileCoord::new(x, y);
    let t = reader.tile_samples();
    let samples = reader
        .tile(coord)
        .with_context(|| format!("Failed to read tile {}", coord))?;

    let mut response = TileResponse {
        x,
        y,
        present: samples.is_some(),
        elevation: None,
        min: None,
        max: None,
        void_samples: None,
    };

    if let Some(samples) = &samples {
        if let (Some(row), Some(col)) = (row, col) {
            if row >= t || col >= t {
                bail!("Sample ({}, {}) outside {}x{} tile", row, col, t, t);
            }
            response.elevation = Some(samples[row * t + col]);
        } else {
            let valid = samples.iter().copied().filter(|&s| s != VOID_VALUE);
            response.min = valid.clone().min();
            response.max = valid.max();
            response.void_samples = Some(samples.iter().filter(|&&s| s == VOID_VALUE).count());
        }
    }

    if json {
        println!("{}", serde_json::to_string(&response)?);
    } else if !response.present {
        println!("absent");
    } else if let Some(elev) = response.elevation {
        if elev == VOID_VALUE {
            println!("void");
        } else {
            println!("{}", elev);
        }
    } else {
        println!("Tile {} ({}x{} samples)", coord, t, t);
        if let (Some(min), Some(max)) = (response.min, response.max) {
            println!("Min elevation: {}m", min);
            println!("Max elevation: {}m", max);
        }
        if let Some(void) = response.void_samples.filter(|&v| v > 0) {
            println!("Void samples: {}", void);
        }
    }

    Ok(())
}
