//! Batch buffering and bulk writing.
//!
//! Documents accumulate in one buffer per destination partition and are
//! flushed as a single bulk request when the configured batch size is
//! reached, plus a final flush per file for whatever remains. The sink also
//! owns the destination lifecycle: before the first document for a
//! partition is buffered, the index is deleted (if present) and recreated
//! from the mapping definition, at most once per partition per run.

use bytes::Bytes;
use serde_json::json;
use snafu::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{BulkItemsSnafu, SerializeSnafu, StoreError};
use crate::pipeline::progress::Progress;
use crate::store::Store;
use crate::transform::Document;

/// Bound on logged item-level bulk errors, to avoid flooding the log when a
/// whole batch is rejected.
const MAX_LOGGED_ITEM_ERRORS: usize = 5;

#[derive(Debug, Default)]
struct Buffer {
    lines: Vec<String>,
    count: usize,
}

/// Per-partition batch buffer backed by a bulk-write [`Store`].
pub struct BulkSink<S: Store> {
    store: Arc<S>,
    mapping: Arc<serde_json::Value>,
    batch_size: usize,
    refresh: bool,
    buffers: HashMap<String, Buffer>,
    ensured: HashSet<String>,
    progress: Progress,
}

impl<S: Store> BulkSink<S> {
    pub fn new(
        store: Arc<S>,
        mapping: Arc<serde_json::Value>,
        batch_size: usize,
        refresh: bool,
        progress: Progress,
    ) -> Self {
        Self {
            store,
            mapping,
            batch_size: batch_size.max(1),
            refresh,
            buffers: HashMap::new(),
            ensured: HashSet::new(),
            progress,
        }
    }

    /// Buffer one document for a partition, ensuring the destination on
    /// first use and flushing when the buffer reaches the batch size.
    pub async fn add(&mut self, partition: &str, doc: &Document) -> Result<(), StoreError> {
        self.ensure(partition).await?;

        let action =
            serde_json::to_string(&json!({"index": {"_index": partition}}))
                .context(SerializeSnafu)?;
        let line = serde_json::to_string(doc).context(SerializeSnafu)?;

        let buffer = self.buffers.entry(partition.to_string()).or_default();
        buffer.lines.push(action);
        buffer.lines.push(line);
        buffer.count += 1;

        if buffer.count >= self.batch_size {
            self.flush(partition).await?;
        }
        Ok(())
    }

    /// Ensure the destination index exists, at most once per partition per
    /// run: delete-then-recreate when present, create directly when absent.
    /// Each run is a clean load, not an incremental upsert.
    async fn ensure(&mut self, name: &str) -> Result<(), StoreError> {
        if self.ensured.contains(name) {
            return Ok(());
        }

        if self.store.index_exists(name).await? {
            info!("Deleting existing index '{name}' before import");
            if self.store.delete_index(name).await? {
                info!("Index '{name}' deleted");
            } else {
                warn!("Index '{name}' was already gone");
            }
        }

        info!("Creating index: {name}");
        self.store.create_index(name, &self.mapping).await?;
        self.ensured.insert(name.to_string());
        Ok(())
    }

    /// Flush one partition's buffer as a single bulk request. Item-level
    /// errors are logged (bounded) and abort the run.
    pub async fn flush(&mut self, partition: &str) -> Result<usize, StoreError> {
        let Some(buffer) = self.buffers.get_mut(partition) else {
            return Ok(0);
        };
        if buffer.count == 0 {
            return Ok(0);
        }

        let payload = Bytes::from(buffer.lines.join("\n") + "\n");
        let docs = buffer.count;

        let response = self.store.bulk(payload, self.refresh).await?;
        if response.errors {
            let errors = response.item_errors();
            if errors.is_empty() {
                error!("Bulk response reported errors but carried no item details");
            }
            for item_error in errors.iter().take(MAX_LOGGED_ITEM_ERRORS) {
                error!("Bulk item error: {item_error}");
            }
            return BulkItemsSnafu {
                count: errors.len(),
            }
            .fail();
        }

        buffer.lines.clear();
        buffer.count = 0;
        self.progress.add_loaded(docs);
        Ok(docs)
    }

    /// Flush every non-empty buffer. Called at end-of-file so no partial
    /// batch is ever silently dropped.
    pub async fn flush_all(&mut self) -> Result<usize, StoreError> {
        let pending: Vec<String> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.count > 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut total = 0;
        for partition in pending {
            total += self.flush(&partition).await?;
        }
        Ok(total)
    }

    /// Records successfully flushed so far in this run.
    pub fn loaded(&self) -> u64 {
        self.progress.loaded()
    }

    /// Terminate the progress status line.
    pub fn finish_progress(&self) {
        self.progress.finish();
    }
}
