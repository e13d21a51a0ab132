//! contrail: a standalone tool for loading airline on-time performance
//! extracts into an Elasticsearch-compatible search store.
//!
//! Reads plain, gzip-compressed, or zip-wrapped CSV extracts, enriches each
//! row from static reference tables, and bulk-writes documents into
//! time-partitioned indices derived from the input filename or record date.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use contrail::config::{self, StoreSettings};
use contrail::error::{ConfigSnafu, ImportError, SourceSnafu, StoreSnafu};
use contrail::extract;
use contrail::lookup::{AirportLookup, CancellationLookup};
use contrail::pipeline::{progress::format_number, sample, Importer};
use contrail::source;
use contrail::store::{Store, StoreClient};
use contrail::transform::Transformer;

/// Flight data import tool.
#[derive(Parser, Debug)]
#[command(name = "contrail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the store connection config (YAML).
    #[arg(short = 'c', long, default_value = "config/contrail.yml")]
    config: PathBuf,

    /// Path to the index mapping definition (JSON).
    #[arg(short = 'm', long, default_value = "config/mappings-flights.json")]
    mapping: PathBuf,

    /// Directory containing data files.
    #[arg(short = 'd', long, default_value = "data")]
    data_dir: PathBuf,

    /// Import only the specified file.
    #[arg(short = 'f', long, conflicts_with_all = ["all", "glob"])]
    file: Option<PathBuf>,

    /// Import every .zip and .csv file in the data directory.
    #[arg(short = 'a', long, conflicts_with_all = ["file", "glob"])]
    all: bool,

    /// Import files matching the glob pattern.
    #[arg(short = 'g', long, conflicts_with_all = ["file", "all"])]
    glob: Option<String>,

    /// Destination index name prefix.
    #[arg(long, default_value = "flights")]
    index: String,

    /// Number of documents per bulk request.
    #[arg(long, default_value_t = 500)]
    batch_size: usize,

    /// Request an index refresh after each bulk flush.
    #[arg(long)]
    refresh: bool,

    /// Test the connection and print cluster health, then exit.
    #[arg(long)]
    status: bool,

    /// Delete the target index and exit.
    #[arg(long, conflicts_with = "status")]
    delete_index: bool,

    /// Print the first transformed document from the selected file and exit.
    #[arg(long, conflicts_with_all = ["status", "delete_index"])]
    sample: bool,

    /// Merge the selected archives into per-year CSV files under this
    /// directory instead of importing.
    #[arg(long, value_name = "DIR", conflicts_with_all = ["status", "delete_index", "sample"])]
    extract_to: Option<PathBuf>,

    /// Path to the airports reference file for geo-coordinate enrichment.
    #[arg(long, default_value = "data/airports.csv.gz")]
    airports: PathBuf,

    /// Path to the cancellations reference file for reason enrichment.
    #[arg(long, default_value = "data/cancellations.csv")]
    cancellations: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn selected_files(&self) -> Result<Vec<PathBuf>, ImportError> {
        source::files_to_process(
            &self.data_dir,
            self.file.as_deref(),
            self.all,
            self.glob.as_deref(),
        )
        .context(SourceSnafu)
    }

    fn transformer(&self) -> Transformer {
        // Lookup tables are built once here, before any processing, and are
        // read-only for the rest of the run.
        Transformer::new(
            AirportLookup::load(Some(&self.airports)),
            CancellationLookup::load(Some(&self.cancellations)),
        )
    }
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ImportError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("contrail starting");

    // Modes that never touch the store.
    if args.sample {
        let files = args.selected_files()?;
        let transformer = args.transformer();
        match sample(&files[0], &transformer).context(SourceSnafu)? {
            Some(doc) => println!(
                "{}",
                serde_json::to_string_pretty(&doc).unwrap_or_default()
            ),
            None => warn!("{} holds no data rows", files[0].display()),
        }
        return Ok(());
    }

    if let Some(out_dir) = &args.extract_to {
        let files = args.selected_files()?;
        let reports = extract::extract_by_year(&files, out_dir).await?;
        let total: u64 = reports.iter().map(|r| r.rows).sum();
        info!(
            "Extraction complete: {} row(s) across {} year file(s)",
            format_number(total),
            reports.len()
        );
        return Ok(());
    }

    let settings = StoreSettings::from_file(&args.config).context(ConfigSnafu)?;
    let client = StoreClient::new(&settings).context(StoreSnafu)?;

    if args.status {
        let health = client.cluster_health().await.context(StoreSnafu)?;
        info!("Cluster status: {}", health.status);
        info!(
            "Active shards: {}, node count: {}",
            health.active_shards, health.number_of_nodes
        );
        return Ok(());
    }

    if args.delete_index {
        if client.delete_index(&args.index).await.context(StoreSnafu)? {
            info!("Index '{}' deleted", args.index);
        } else {
            warn!("Index '{}' was not found", args.index);
        }
        return Ok(());
    }

    let mapping = config::load_mapping(&args.mapping).context(ConfigSnafu)?;
    let files = args.selected_files()?;
    let transformer = args.transformer();

    let mut importer = Importer::new(
        Arc::new(client),
        mapping,
        args.index.clone(),
        args.batch_size,
        args.refresh,
        transformer,
    );
    let stats = importer.import_files(&files).await?;

    info!("Run summary:");
    info!("  Rows processed: {}", format_number(stats.rows_processed));
    info!("  Documents indexed: {}", format_number(stats.docs_indexed));
    info!("  Rows skipped: {}", format_number(stats.rows_skipped));
    if stats.gap() > 0 {
        warn!(
            "{} row(s) were read but not indexed",
            format_number(stats.gap())
        );
    }

    Ok(())
}
