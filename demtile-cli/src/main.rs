use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// SRTM tile store builder
#[derive(Parser)]
#[command(name = "demtile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tile store from a directory of grid files
    Build {
        /// Directory containing .hgt, .hgt.gz, .hgt.bz2 or .hgt.zip files
        #[arg(short, long, env = "DEMTILE_INPUT_DIR")]
        input: PathBuf,

        /// Output data file (the index is written to <output>.idx)
        #[arg(short, long, env = "DEMTILE_OUTPUT")]
        output: PathBuf,

        /// Overwrite an existing store
        #[arg(
            long,
            env = "DEMTILE_OVERWRITE",
            value_parser = clap::builder::BoolishValueParser::new()
        )]
        overwrite: bool,

        /// Worker threads (default: CPUs + 1)
        #[arg(short, long, env = "DEMTILE_WORKERS")]
        workers: Option<usize>,

        /// Samples per row/column of every input grid
        #[arg(long, default_value_t = demtile::tile::SRTM1_SAMPLES)]
        samples: usize,

        /// Tiles per cell along each axis
        #[arg(long, env = "DEMTILE_SPLIT", default_value_t = demtile::tile::DEFAULT_SPLIT)]
        split: usize,

        /// LZ4 HC compression level
        #[arg(long, default_value_t = demtile::codec::HIGH_COMPRESSION)]
        level: i32,

        /// Print the build summary as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Display information about a built tile store
    Info {
        /// Path to the store's data file
        store: PathBuf,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List grid files in an input directory without building
    List {
        /// Directory containing grid files
        #[arg(env = "DEMTILE_INPUT_DIR")]
        dir: PathBuf,
    },

    /// Read one tile back from a built store
    Query {
        /// Path to the store's data file
        store: PathBuf,

        /// Tile X coordinate (lon × split + dx)
        #[arg(short, long, allow_hyphen_values = true)]
        x: i32,

        /// Tile Y coordinate (lat × split + dy)
        #[arg(short, long, allow_hyphen_values = true)]
        y: i32,

        /// Payload row (0 = southern edge of the tile)
        #[arg(long, requires = "col")]
        row: Option<usize>,

        /// Payload column (0 = western edge of the tile)
        #[arg(long, requires = "row")]
        col: Option<usize>,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demtile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            overwrite,
            workers,
            samples,
            split,
            level,
            json,
        } => commands::build::run(
            input, output, overwrite, workers, samples, split, level, json,
        ),
        Commands::Info { store, json } => commands::info::run(store, json),
        Commands::List { dir } => commands::list::run(dir),
        Commands::Query {
            store,
            x,
            y,
            row,
            col,
            json,
        } => commands::query::run(store, x, y, row, col, json),
    }
}
