use csv_ingest_core::error::IngestError;

/// Object storage holding the files to ingest.
pub trait SourceStore {
    fn read_object(&self, key: &str) -> Result<Vec<u8>, IngestError>;

    fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), IngestError>;

    fn delete_object(&self, key: &str) -> Result<(), IngestError>;
}
