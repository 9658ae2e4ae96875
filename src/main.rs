//! playlake: loads song catalog and listening logs into a Parquet star schema.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use playlake::config::Config;
use playlake::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use playlake::metrics;
use playlake::pipeline::Pipeline;

/// Song catalog and listening logs to partitioned Parquet tables.
#[derive(Parser, Debug)]
#[command(name = "playlake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "playlake.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate configuration and list input files without writing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("playlake starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    let metrics_server = if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        let server = metrics::init(addr).await.context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
        Some(server)
    } else {
        None
    };

    let result = execute(config, args.dry_run).await;

    if let Some(server) = metrics_server {
        server.shutdown().await;
    }
    result?;

    if !args.dry_run {
        println!("Done!");
    }
    Ok(())
}

/// Run the pipeline, or only list its inputs when `dry_run` is set.
async fn execute(config: Config, dry_run: bool) -> Result<(), PipelineError> {
    let pipeline = Pipeline::new(config.clone()).await?;

    if dry_run {
        info!("Dry run mode - validating configuration");
        info!("Input: {}", config.input.path);
        info!("Output: {}", config.output.path);
        info!("Timezone: {}", config.time.timezone);
        let listing = pipeline.list_inputs().await?;
        info!(
            "Would read {} catalog files from {}",
            listing.catalog_files.len(),
            config.input.song_data
        );
        info!(
            "Would read {} activity files from {}",
            listing.activity_files.len(),
            config.input.log_data
        );
        for file in listing.catalog_files.iter().chain(&listing.activity_files) {
            debug!("  - {}", file);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = pipeline.run().await?;

    info!("Pipeline completed successfully");
    info!(
        "  Catalog: {} documents from {} files",
        stats.catalog_documents, stats.catalog_files
    );
    info!(
        "  Activity: {} documents from {} files, {} song plays",
        stats.activity_documents, stats.activity_files, stats.song_plays
    );
    info!(
        "  Join: {} matched, {} unmatched, {} multi-matched, {} skipped",
        stats.join.matched, stats.join.unmatched, stats.join.multi_matched, stats.join.skipped
    );
    for table in &stats.tables {
        info!(
            "  {}: {} rows, {} files, {} bytes",
            table.table, table.rows, table.files, table.bytes
        );
    }

    Ok(())
}
