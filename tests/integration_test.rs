//! Integration tests for contrail.
//!
//! Runs the import pipeline end-to-end over temporary fixture files against
//! a recording in-memory store, so batching, routing, destination lifecycle
//! and failure propagation can be observed without a live cluster.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use contrail::error::{ImportError, StoreError};
use contrail::lookup::{AirportLookup, CancellationLookup};
use contrail::pipeline::Importer;
use contrail::store::{BulkItem, BulkItemStatus, BulkResponse, ClusterHealth, Store};
use contrail::transform::Transformer;

/// One recorded bulk request: destination partition and document count.
#[derive(Debug, Clone, PartialEq)]
struct RecordedBulk {
    partition: String,
    docs: usize,
}

/// In-memory store that records every call the pipeline makes.
#[derive(Default)]
struct RecordingStore {
    existing: Mutex<HashSet<String>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    bulks: Mutex<Vec<RecordedBulk>>,
    fail_bulk: bool,
}

impl RecordingStore {
    fn with_existing(names: &[&str]) -> Self {
        let store = Self::default();
        store
            .existing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        store
    }

    fn failing_bulk() -> Self {
        Self {
            fail_bulk: true,
            ..Self::default()
        }
    }

    fn bulks(&self) -> Vec<RecordedBulk> {
        self.bulks.lock().unwrap().clone()
    }

    fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.existing.lock().unwrap().contains(name))
    }

    async fn create_index(&self, name: &str, _mapping: &Value) -> Result<(), StoreError> {
        self.created.lock().unwrap().push(name.to_string());
        self.existing.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<bool, StoreError> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(self.existing.lock().unwrap().remove(name))
    }

    async fn bulk(&self, payload: Bytes, _refresh: bool) -> Result<BulkResponse, StoreError> {
        let text = std::str::from_utf8(&payload).expect("bulk payload must be UTF-8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len() % 2, 0, "bulk payload must pair actions with documents");

        let action: Value = serde_json::from_str(lines[0]).expect("action line must be JSON");
        let partition = action["index"]["_index"]
            .as_str()
            .expect("action line must carry _index")
            .to_string();

        self.bulks.lock().unwrap().push(RecordedBulk {
            partition,
            docs: lines.len() / 2,
        });

        if self.fail_bulk {
            return Ok(BulkResponse {
                errors: true,
                items: vec![BulkItem {
                    index: Some(BulkItemStatus {
                        status: 400,
                        error: Some(json!({"type": "mapper_parsing_exception"})),
                    }),
                }],
            });
        }
        Ok(BulkResponse::default())
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
        Ok(ClusterHealth::default())
    }
}

fn importer(store: Arc<RecordingStore>, batch_size: usize) -> Importer<RecordingStore> {
    Importer::new(
        store,
        json!({"mappings": {"properties": {}}}),
        "flights",
        batch_size,
        false,
        Transformer::new(AirportLookup::load(None), CancellationLookup::load(None)),
    )
}

fn write_file(dir: &Path, name: &str, data: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn write_gzip(dir: &Path, name: &str, data: &str) -> PathBuf {
    let path = dir.join(name);
    let mut encoder =
        flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

const HEADER: &str = "FlightDate,Reporting_Airline,Flight_Number_Reporting_Airline,Origin,Dest";

mod import_tests {
    use super::*;

    #[tokio::test]
    async fn test_two_row_file_indexes_one_and_skips_one() {
        let dir = tempfile::tempdir().unwrap();
        // No year in the filename: routing falls back to each row's date,
        // and the row with a blank FlightDate is skipped.
        let file = write_file(
            dir.path(),
            "ontime.csv",
            &format!("{HEADER}\n2024-07-01,AA,100,JFK,LAX\n,AA,101,JFK,LAX\n"),
        );

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 500);
        let stats = importer.import_files(&[file]).await.unwrap();

        assert_eq!(stats.total_rows, 2);
        assert_eq!(stats.rows_processed, 2);
        assert_eq!(stats.docs_indexed, 1);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.gap(), 1);

        assert_eq!(store.created(), vec!["flights-2024"]);
        assert_eq!(
            store.bulks(),
            vec![RecordedBulk {
                partition: "flights-2024".to_string(),
                docs: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_batch_size_two_flushes_five_docs_as_2_2_1() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = format!("{HEADER}\n");
        for day in 1..=5 {
            data.push_str(&format!("2024-07-{day:02},AA,{day},JFK,LAX\n"));
        }
        let file = write_file(dir.path(), "flights-2024-07.csv", &data);

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 2);
        let stats = importer.import_files(&[file]).await.unwrap();

        let batch_sizes: Vec<usize> = store.bulks().iter().map(|b| b.docs).collect();
        assert_eq!(batch_sizes, vec![2, 2, 1]);
        assert!(store
            .bulks()
            .iter()
            .all(|b| b.partition == "flights-2024-07"));
        assert_eq!(stats.docs_indexed, 5);
        assert_eq!(stats.total_rows, 5);
    }

    #[tokio::test]
    async fn test_filename_period_overrides_record_dates() {
        let dir = tempfile::tempdir().unwrap();
        // Rows from scattered years; the filename pins the partition.
        let file = write_gzip(
            dir.path(),
            "flights-2024-07.csv.gz",
            &format!("{HEADER}\n1999-01-01,AA,1,JFK,LAX\n2003-06-15,UA,2,SFO,ORD\n"),
        );

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 500);
        let stats = importer.import_files(&[file]).await.unwrap();

        assert_eq!(stats.docs_indexed, 2);
        assert_eq!(store.created(), vec!["flights-2024-07"]);
        assert!(store
            .bulks()
            .iter()
            .all(|b| b.partition == "flights-2024-07"));
    }

    #[tokio::test]
    async fn test_existing_destination_is_deleted_and_recreated_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = format!("{HEADER}\n");
        for day in 1..=5 {
            data.push_str(&format!("2019-03-{day:02},DL,{day},ATL,MIA\n"));
        }
        let file = write_file(dir.path(), "flights-2019.csv", &data);

        let store = Arc::new(RecordingStore::with_existing(&["flights-2019"]));
        // Batch size 1 forces several flushes; the ensure step must still
        // run exactly once.
        let mut importer = importer(store.clone(), 1);
        importer.import_files(&[file]).await.unwrap();

        assert_eq!(store.deleted(), vec!["flights-2019"]);
        assert_eq!(store.created(), vec!["flights-2019"]);
        assert_eq!(store.bulks().len(), 5);
    }

    #[tokio::test]
    async fn test_bulk_item_errors_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = format!("{HEADER}\n");
        for day in 1..=6 {
            data.push_str(&format!("2024-07-{day:02},AA,{day},JFK,LAX\n"));
        }
        let file = write_file(dir.path(), "flights-2024-07.csv", &data);

        let store = Arc::new(RecordingStore::failing_bulk());
        let mut importer = importer(store.clone(), 2);
        let result = importer.import_files(&[file]).await;

        assert!(matches!(
            result,
            Err(ImportError::Store {
                source: StoreError::BulkItems { .. }
            })
        ));
        // The first flush failed, so no further rows were submitted and no
        // documents may be claimed as loaded.
        assert_eq!(store.bulks().len(), 1);
        assert_eq!(importer.stats().docs_indexed, 0);
    }

    #[tokio::test]
    async fn test_multiple_files_share_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let july = write_file(
            dir.path(),
            "flights-2024-07.csv",
            &format!("{HEADER}\n2024-07-01,AA,1,JFK,LAX\n"),
        );
        let august = write_file(
            dir.path(),
            "flights-2024-08.csv",
            &format!("{HEADER}\n2024-08-01,AA,1,JFK,LAX\n2024-08-02,AA,2,JFK,LAX\n"),
        );

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 500);
        let stats = importer.import_files(&[july, august]).await.unwrap();

        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.docs_indexed, 3);
        assert_eq!(
            store.created(),
            vec!["flights-2024-07", "flights-2024-08"]
        );
        // End-of-file flushes: one partial batch per file.
        assert_eq!(
            store.bulks(),
            vec![
                RecordedBulk {
                    partition: "flights-2024-07".to_string(),
                    docs: 1,
                },
                RecordedBulk {
                    partition: "flights-2024-08".to_string(),
                    docs: 2,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_zip_input_routes_by_filename_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flights-2019.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("ontime.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(format!("{HEADER}\n2021-05-03,WN,44,DAL,HOU\n").as_bytes())
            .unwrap();
        writer.finish().unwrap();

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 500);
        let stats = importer.import_files(&[path]).await.unwrap();

        assert_eq!(stats.docs_indexed, 1);
        assert_eq!(store.created(), vec!["flights-2019"]);
    }

    #[tokio::test]
    async fn test_pre_count_matches_indexed_totals() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_gzip(
            dir.path(),
            "flights-2024-07.csv.gz",
            &format!("{HEADER}\n2024-07-01,AA,1,JFK,LAX\n2024-07-02,AA,2,JFK,LAX\n"),
        );

        let store = Arc::new(RecordingStore::default());
        let mut importer = importer(store.clone(), 500);
        let stats = importer.import_files(&[file]).await.unwrap();

        assert_eq!(stats.total_rows, 2);
        assert_eq!(stats.docs_indexed, 2);
        assert_eq!(stats.gap(), 0);
    }
}

mod document_tests {
    use super::*;

    /// The documents submitted in bulk payloads carry renamed, coerced
    /// fields with nulls pruned.
    #[tokio::test]
    async fn test_flushed_documents_are_pruned_and_renamed() {
        #[derive(Default)]
        struct CapturingStore {
            payloads: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl Store for CapturingStore {
            async fn index_exists(&self, _name: &str) -> Result<bool, StoreError> {
                Ok(false)
            }
            async fn create_index(&self, _name: &str, _mapping: &Value) -> Result<(), StoreError> {
                Ok(())
            }
            async fn delete_index(&self, _name: &str) -> Result<bool, StoreError> {
                Ok(false)
            }
            async fn bulk(&self, payload: Bytes, _refresh: bool) -> Result<BulkResponse, StoreError> {
                self.payloads
                    .lock()
                    .unwrap()
                    .push(String::from_utf8(payload.to_vec()).unwrap());
                Ok(BulkResponse::default())
            }
            async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
                Ok(ClusterHealth::default())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let file = write_file(
            dir.path(),
            "flights-2024-07.csv",
            &format!("{HEADER},DepDelay,Cancelled,Tail_Number\n2024-07-01,AA,100,JFK,LAX,12.6,0,\n"),
        );

        let store = Arc::new(CapturingStore::default());
        let mut importer = Importer::new(
            store.clone(),
            json!({}),
            "flights",
            500,
            false,
            Transformer::new(AirportLookup::load(None), CancellationLookup::load(None)),
        );
        importer.import_files(&[file]).await.unwrap();

        let payloads = store.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let mut lines = payloads[0].lines();
        let action: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(action["index"]["_index"], "flights-2024-07");

        let doc: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(doc["FlightID"], "2024-07-01_AA_100_JFK_LAX");
        assert_eq!(doc["DepDelayMin"], 13);
        assert_eq!(doc["Cancelled"], false);
        // Blank Tail_Number was pruned, not serialized as null.
        assert!(doc.get("Tail_Number").is_none());
        assert_eq!(doc["@timestamp"], "2024-07-01");
    }
}
