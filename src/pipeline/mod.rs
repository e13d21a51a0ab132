//! Run orchestration.
//!
//! Sequences the archive reader, transformer, partition router, and bulk
//! sink per input file and across a file set. The per-row loop is strictly
//! sequential: each row is read, transformed, routed, and buffered before
//! the next row is read, and a flush blocks the loop until the store
//! answers.

pub mod partition;
pub mod progress;

use serde_json::Value;
use snafu::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ImportError, SourceError, SourceSnafu, StoreSnafu};
use crate::sink::BulkSink;
use crate::source::RecordStream;
use crate::store::Store;
use crate::transform::{self, Document, Transformer, TIMESTAMP_FIELD};

use progress::{format_number, Progress};

/// Cap on logged skip events per run; later skips are counted silently.
const MAX_SKIP_WARNINGS: u64 = 5;

/// Counters for one import run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Rows counted ahead of processing (0 when the pre-count failed).
    pub total_rows: u64,
    /// Data rows read from input files.
    pub rows_processed: u64,
    /// Documents successfully flushed to the store.
    pub docs_indexed: u64,
    /// Rows dropped because no partition could be derived or the line did
    /// not parse.
    pub rows_skipped: u64,
}

impl RunStats {
    /// Rows read but not indexed.
    pub fn gap(&self) -> u64 {
        self.rows_processed.saturating_sub(self.docs_indexed)
    }
}

/// Orchestrates one import run. Owns the lookup tables (inside the
/// transformer), the destination-ensure tracking (inside the sink), and the
/// run counters; nothing here outlives the run.
pub struct Importer<S: Store> {
    store: Arc<S>,
    mapping: Arc<Value>,
    prefix: String,
    batch_size: usize,
    refresh: bool,
    transformer: Transformer,
    stats: RunStats,
}

impl<S: Store> Importer<S> {
    pub fn new(
        store: Arc<S>,
        mapping: Value,
        prefix: impl Into<String>,
        batch_size: usize,
        refresh: bool,
        transformer: Transformer,
    ) -> Self {
        Self {
            store,
            mapping: Arc::new(mapping),
            prefix: prefix.into(),
            batch_size,
            refresh,
            transformer,
            stats: RunStats::default(),
        }
    }

    /// Import a set of files in the order supplied.
    pub async fn import_files(&mut self, files: &[impl AsRef<Path>]) -> Result<RunStats, ImportError> {
        info!("Counting records in {} file(s)...", files.len());
        self.stats.total_rows = progress::count_rows(
            &files
                .iter()
                .map(|f| f.as_ref().to_path_buf())
                .collect::<Vec<_>>(),
        );
        info!(
            "Total records to import: {}",
            format_number(self.stats.total_rows)
        );
        info!("Importing {} file(s)...", files.len());

        let mut sink = BulkSink::new(
            self.store.clone(),
            self.mapping.clone(),
            self.batch_size,
            self.refresh,
            Progress::new(self.stats.total_rows),
        );

        for path in files {
            self.import_file(path.as_ref(), &mut sink).await?;
        }

        sink.finish_progress();
        self.stats.docs_indexed = sink.loaded();
        info!(
            "Import complete: {} of {} records loaded",
            format_number(self.stats.docs_indexed),
            format_number(self.stats.total_rows)
        );
        Ok(self.stats.clone())
    }

    /// Import one file: read, transform, route, buffer; flush whatever
    /// remains at end of file.
    async fn import_file(
        &mut self,
        path: &Path,
        sink: &mut BulkSink<S>,
    ) -> Result<(), ImportError> {
        if !path.is_file() {
            warn!("Skipping {} (not a regular file)", path.display());
            return Ok(());
        }

        info!("Importing {}", path.display());
        let period = partition::file_period(path);
        let mut stream = RecordStream::open(path).context(SourceSnafu)?;

        let loaded_before = sink.loaded();
        let mut rows = 0u64;

        loop {
            let advanced = match stream.advance() {
                Ok(advanced) => advanced,
                Err(e) if e.is_fatal_read() => return Err(e).context(SourceSnafu),
                Err(e) => {
                    rows += 1;
                    self.stats.rows_processed += 1;
                    self.record_skip(format_args!("row {rows} did not parse: {e}"));
                    continue;
                }
            };
            if !advanced {
                break;
            }
            rows += 1;
            self.stats.rows_processed += 1;

            let row = stream.row();
            let mut doc = self.transformer.transform(&row);

            let timestamp = doc
                .get(TIMESTAMP_FIELD)
                .and_then(Value::as_str)
                .map(str::to_owned);
            let Some(partition_name) =
                partition::route(&self.prefix, timestamp.as_deref(), &period)
            else {
                let raw_timestamp = row.get(TIMESTAMP_FIELD).or_else(|| row.get("FlightDate"));
                self.record_skip(format_args!(
                    "row {rows} has no determinable partition (timestamp: {:?}, origin: {:?}, dest: {:?}, airline: {:?})",
                    raw_timestamp,
                    row.get("Origin"),
                    row.get("Dest"),
                    row.get("Reporting_Airline"),
                ));
                continue;
            };

            transform::prune_nulls(&mut doc);
            sink.add(&partition_name, &doc).await.context(StoreSnafu)?;
        }

        sink.flush_all().await.context(StoreSnafu)?;
        info!(
            "Finished {} (rows processed: {}, documents indexed: {})",
            path.display(),
            rows,
            sink.loaded() - loaded_before
        );
        Ok(())
    }

    /// Count a skipped row, logging the first few occurrences with context.
    fn record_skip(&mut self, context: std::fmt::Arguments<'_>) {
        self.stats.rows_skipped += 1;
        if self.stats.rows_skipped <= MAX_SKIP_WARNINGS {
            warn!("Skipping {context}");
            if self.stats.rows_skipped == MAX_SKIP_WARNINGS {
                warn!("Further skipped rows will be counted but not logged");
            }
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}

/// Transform the first row of a file without touching the store.
/// Diagnostic mode for checking field mappings against real data.
pub fn sample(path: &Path, transformer: &Transformer) -> Result<Option<Document>, SourceError> {
    let mut stream = RecordStream::open(path)?;
    if !stream.advance()? {
        return Ok(None);
    }
    let mut doc = transformer.transform(&stream.row());
    transform::prune_nulls(&mut doc);
    Ok(Some(doc))
}
