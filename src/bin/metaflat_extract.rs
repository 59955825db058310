//! metaflat-extract: Extract platform metadata into fixed-schema tables
//!
//! Usage:
//!   # Read <data-dir>/config.json and <data-dir>/in/state.json,
//!   # write <data-dir>/out/tables/*.csv and <data-dir>/out/state.json
//!   metaflat-extract --data-dir /data --source ./captured
//!
//!   # Verbose logging
//!   RUST_LOG=metaflat=debug metaflat-extract --data-dir /data --source ./captured

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use metaflat::extract::{ConfigFile, DirectorySource, Extractor, RunState};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "metaflat-extract")]
#[command(about = "Extract platform metadata into fixed-schema tables", long_about = None)]
struct Args {
    /// Data directory holding config.json, in/ and out/
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Directory of captured API responses
    #[arg(long)]
    source: PathBuf,

    /// Log at debug level regardless of the configuration
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigFile::from_path(args.data_dir.join("config.json"))
        .context("Failed to load configuration")?;
    let params = config.parameters.with_env();
    init_tracing(args.debug || params.debug);

    let state = RunState::load(args.data_dir.join("in").join("state.json"))
        .context("Failed to load state")?;
    let source = DirectorySource::new(&args.source);
    let output_dir = args.data_dir.join("out").join("tables");

    let mut extractor = Extractor::new(params, source, state);
    let report = match extractor.run(&output_dir) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(kind = ?e.kind(), error = %e, "extraction failed");
            return Err(e.into());
        }
    };

    report
        .state
        .save(args.data_dir.join("out").join("state.json"))
        .context("Failed to save state")?;

    for table in &report.tables {
        tracing::info!(
            table = %table.name,
            rows = table.rows_written,
            skipped = table.rows_skipped,
            "table written"
        );
    }
    tracing::info!(tables = report.tables.len(), output = %output_dir.display(), "extraction finished");

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
