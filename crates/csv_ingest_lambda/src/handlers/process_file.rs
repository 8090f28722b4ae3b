use std::time::Instant;

use csv_ingest_core::error::IngestError;
use csv_ingest_core::record::RowReader;
use csv_ingest_core::storage_keys::{is_processed_key, processed_object_key};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::adapters::item_table::{BatchWriter, ItemTable};
use crate::adapters::object_store::SourceStore;
use crate::handlers::event::decode_object_records;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileReport {
    pub key: String,
    pub items_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedRecord {
    pub index: usize,
    pub key: Option<String>,
    pub error_kind: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EventSummary {
    pub processed: Vec<FileReport>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedRecord>,
}

/// Reads the whole object as UTF-8 text.
pub fn fetch_document(store: &impl SourceStore, key: &str) -> Result<String, IngestError> {
    let bytes = store.read_object(key)?;
    String::from_utf8(bytes).map_err(|error| {
        let valid = &error.as_bytes()[..error.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|byte| **byte == b'\n').count() + 1;
        IngestError::malformed_row(line, format!("object is not valid UTF-8: {error}"))
    })
}

/// Writes every row of `text` to the table and returns the item count.
///
/// A row that fails coercion aborts the document. Items buffered before that
/// row are still flushed, so a failed document may be partly in the table.
pub fn load_items(text: &str, table: &impl ItemTable) -> Result<usize, IngestError> {
    let reader = RowReader::new(text)?;
    let mut writer = BatchWriter::new(table);

    for row in reader {
        match row {
            Ok(item) => writer.put(item)?,
            Err(row_error) => {
                match writer.close() {
                    Ok(flushed) => warn!(
                        component = "process_file",
                        items_flushed = flushed,
                        "document aborted after partial write"
                    ),
                    Err(flush_error) => warn!(
                        component = "process_file",
                        error = %flush_error,
                        "failed to flush buffered items of aborted document"
                    ),
                }
                return Err(row_error);
            }
        }
    }

    writer.close()
}

/// Copies the object to `<key>.PROCESSED` and deletes the original.
pub fn mark_processed(store: &impl SourceStore, key: &str) -> Result<String, IngestError> {
    let destination = processed_object_key(key);
    store.copy_object(key, &destination)?;
    store.delete_object(key)?;
    Ok(destination)
}

/// Fetch, transform and load one object, then optionally mark it processed.
pub fn process_file(
    key: &str,
    mark: bool,
    store: &impl SourceStore,
    table: &impl ItemTable,
) -> Result<FileReport, IngestError> {
    let started_at = Instant::now();
    let text = fetch_document(store, key)?;
    let items_written = load_items(&text, table)?;

    // Rows are already in the table here; a failed rename means a redelivery
    // writes them again.
    let processed_key = if mark {
        Some(mark_processed(store, key)?)
    } else {
        None
    };

    info!(
        component = "process_file",
        key,
        items_written,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "file_processed"
    );
    Ok(FileReport {
        key: key.to_string(),
        items_written,
        processed_key,
    })
}

/// Processes every record of a storage notification independently.
///
/// Only an event without a `Records` array is an error; per-record failures
/// are logged and collected in the summary.
pub fn handle_event(
    event: &Value,
    mark: bool,
    store: &impl SourceStore,
    table: &impl ItemTable,
) -> Result<EventSummary, String> {
    let records = decode_object_records(event)?;
    let mut summary = EventSummary::default();

    for record in records {
        let Some(key) = record.key else {
            error!(
                component = "handler",
                index = record.index,
                "record carries no object key"
            );
            summary.failed.push(FailedRecord {
                index: record.index,
                key: None,
                error_kind: "malformed_event".to_string(),
                error_message: "record carries no s3.object.key string".to_string(),
            });
            continue;
        };

        if is_processed_key(&key) {
            info!(component = "handler", key = %key, "skipping already processed object");
            summary.skipped.push(key);
            continue;
        }

        match process_file(&key, mark, store, table) {
            Ok(report) => summary.processed.push(report),
            Err(error) => {
                error!(
                    component = "handler",
                    key = %key,
                    error_kind = error.kind(),
                    error = %error,
                    "file_failed"
                );
                summary.failed.push(FailedRecord {
                    index: record.index,
                    key: Some(key),
                    error_kind: error.kind().to_string(),
                    error_message: error.to_string(),
                });
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use csv_ingest_core::record::{Item, ItemValue};
    use serde_json::json;

    use super::*;

    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        fail_copy: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
                fail_copy: false,
            }
        }

        fn with_object(self, key: &str, body: &str) -> Self {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .insert(key.to_string(), body.as_bytes().to_vec());
            self
        }

        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self
                .objects
                .lock()
                .expect("poisoned mutex")
                .keys()
                .cloned()
                .collect();
            keys.sort();
            keys
        }
    }

    impl SourceStore for MemoryStore {
        fn read_object(&self, key: &str) -> Result<Vec<u8>, IngestError> {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .get(key)
                .cloned()
                .ok_or_else(|| IngestError::NotFound(format!("no object {key}")))
        }

        fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), IngestError> {
            if self.fail_copy {
                return Err(IngestError::PermissionDenied("s3:PutObject".to_string()));
            }
            let mut objects = self.objects.lock().expect("poisoned mutex");
            let body = objects
                .get(source_key)
                .cloned()
                .ok_or_else(|| IngestError::NotFound(source_key.to_string()))?;
            objects.insert(destination_key.to_string(), body);
            Ok(())
        }

        fn delete_object(&self, key: &str) -> Result<(), IngestError> {
            self.objects.lock().expect("poisoned mutex").remove(key);
            Ok(())
        }
    }

    struct MemoryTable {
        items: Mutex<Vec<Item>>,
    }

    impl MemoryTable {
        fn new() -> Self {
            Self {
                items: Mutex::new(Vec::new()),
            }
        }

        fn items(&self) -> Vec<Item> {
            self.items.lock().expect("poisoned mutex").clone()
        }
    }

    impl ItemTable for MemoryTable {
        fn batch_put(&self, items: &[Item]) -> Result<Vec<Item>, IngestError> {
            self.items
                .lock()
                .expect("poisoned mutex")
                .extend(items.iter().cloned());
            Ok(Vec::new())
        }
    }

    const SAMPLE: &str = "id;name;x;date\n101;Name;X;01/02/2020\n102;Other;Y;02/02/2020\n";

    fn s3_event(keys: &[&str]) -> Value {
        json!({
            "Records": keys
                .iter()
                .map(|key| json!({"eventSource": "aws:s3", "s3": {"object": {"key": key}}}))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn processes_file_into_items_and_marks_it() {
        let store = MemoryStore::new().with_object("sales.csv", SAMPLE);
        let table = MemoryTable::new();

        let report = process_file("sales.csv", true, &store, &table).expect("file should process");

        assert_eq!(report.items_written, 2);
        assert_eq!(report.processed_key.as_deref(), Some("sales.csv.PROCESSED"));
        assert_eq!(store.keys(), vec!["sales.csv.PROCESSED"]);

        let items = table.items();
        assert_eq!(
            items[0],
            Item::from([
                ("ID".to_string(), ItemValue::Number(101)),
                ("name".to_string(), ItemValue::Text("Name".to_string())),
                ("x".to_string(), ItemValue::Text("X".to_string())),
                ("TIMESTAMP".to_string(), ItemValue::Number(1_580_515_200)),
            ])
        );
    }

    #[test]
    fn unmarked_variant_leaves_source_in_place() {
        let store = MemoryStore::new().with_object("sales.csv", SAMPLE);
        let table = MemoryTable::new();

        let report =
            process_file("sales.csv", false, &store, &table).expect("file should process");

        assert_eq!(report.processed_key, None);
        assert_eq!(store.keys(), vec!["sales.csv"]);
        assert_eq!(table.items().len(), 2);
    }

    #[test]
    fn missing_object_writes_nothing() {
        let store = MemoryStore::new();
        let table = MemoryTable::new();

        let error = process_file("absent.csv", true, &store, &table).expect_err("should fail");

        assert!(error.is_not_found());
        assert!(table.items().is_empty());
    }

    #[test]
    fn malformed_row_flushes_earlier_rows_and_keeps_source() {
        let body = "id;name;x;date\n1;a;b;01/01/2020\n2;a;b;01/01/2020\nthree;a;b;01/01/2020\n4;a;b;01/01/2020\n";
        let store = MemoryStore::new().with_object("bad.csv", body);
        let table = MemoryTable::new();

        let error = process_file("bad.csv", true, &store, &table).expect_err("should fail");

        assert_eq!(error.kind(), "malformed_row");
        assert_eq!(table.items().len(), 2);
        assert_eq!(store.keys(), vec!["bad.csv"]);
    }

    #[test]
    fn rename_failure_is_reported_after_rows_are_written() {
        let mut store = MemoryStore::new().with_object("sales.csv", SAMPLE);
        store.fail_copy = true;
        let table = MemoryTable::new();

        let error = process_file("sales.csv", true, &store, &table).expect_err("should fail");

        assert_eq!(error.kind(), "permission_denied");
        assert_eq!(table.items().len(), 2);
        assert_eq!(store.keys(), vec!["sales.csv"]);
    }

    #[test]
    fn non_utf8_object_is_malformed() {
        let store = MemoryStore::new();
        store
            .objects
            .lock()
            .expect("poisoned mutex")
            .insert("latin1.csv".to_string(), b"id;n;x;d\n1;\xe9;x;01/01/2020\n".to_vec());

        let error = fetch_document(&store, "latin1.csv").expect_err("should fail");
        assert!(matches!(error, IngestError::MalformedRow { line: 2, .. }));
    }

    #[test]
    fn one_failing_record_does_not_stop_the_rest() {
        let store = MemoryStore::new()
            .with_object("good.csv", SAMPLE)
            .with_object("bad.csv", "id;name;x;date\n1;a;b;2020-01-01\n");
        let table = MemoryTable::new();

        let summary = handle_event(
            &s3_event(&["bad.csv", "missing.csv", "good.csv"]),
            true,
            &store,
            &table,
        )
        .expect("event should be handled");

        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.processed[0].key, "good.csv");
        let failed_kinds: Vec<&str> = summary
            .failed
            .iter()
            .map(|failed| failed.error_kind.as_str())
            .collect();
        assert_eq!(failed_kinds, vec!["malformed_row", "not_found"]);
        assert_eq!(summary.failed[1].index, 1);
        assert_eq!(table.items().len(), 2);
    }

    #[test]
    fn processed_markers_and_keyless_records_are_not_ingested() {
        let store = MemoryStore::new().with_object("sales.csv.PROCESSED", SAMPLE);
        let table = MemoryTable::new();
        let event = json!({
            "Records": [
                {"s3": {"object": {"key": "sales.csv.PROCESSED"}}},
                {"s3": {"object": {}}}
            ]
        });

        let summary = handle_event(&event, true, &store, &table).expect("event should be handled");

        assert_eq!(summary.skipped, vec!["sales.csv.PROCESSED"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].error_kind, "malformed_event");
        assert!(table.items().is_empty());
    }

    #[test]
    fn event_without_records_is_rejected() {
        let error = handle_event(&json!({}), true, &MemoryStore::new(), &MemoryTable::new())
            .expect_err("event should be rejected");
        assert!(error.contains("Records"));
    }

    #[test]
    fn summary_serializes_as_lambda_response() {
        let store = MemoryStore::new().with_object("sales.csv", SAMPLE);
        let table = MemoryTable::new();

        let summary = handle_event(&s3_event(&["sales.csv"]), false, &store, &table)
            .expect("event should be handled");
        let response = serde_json::to_value(&summary).expect("summary should serialize");

        assert_eq!(
            response,
            json!({
                "processed": [{"key": "sales.csv", "items_written": 2}],
                "skipped": [],
                "failed": []
            })
        );
    }
}
