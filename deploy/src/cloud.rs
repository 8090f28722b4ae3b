use std::path::{Path, PathBuf};

use csv_ingest_core::contract::StackRequest;
use csv_ingest_core::error::IngestError;

/// Object metadata key the package fingerprint is stored under.
pub const FINGERPRINT_METADATA_KEY: &str = "sha256";

pub trait ArtifactStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, IngestError>;

    fn create_bucket(&self, bucket: &str) -> Result<(), IngestError>;

    /// Deletes every object and returns how many were removed.
    fn empty_bucket(&self, bucket: &str) -> Result<usize, IngestError>;

    /// Deletes an empty bucket.
    fn delete_bucket(&self, bucket: &str) -> Result<(), IngestError>;

    /// Fingerprint recorded on the object at upload, `None` if the object or
    /// the metadata is absent.
    fn object_fingerprint(&self, bucket: &str, key: &str) -> Result<Option<String>, IngestError>;

    fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        fingerprint: Option<&str>,
    ) -> Result<(), IngestError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackState {
    Absent,
    Present { status: String },
}

impl StackState {
    /// A stack left behind by a failed creation cannot be created again until
    /// it is deleted.
    pub fn is_failed_creation(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Present { status } => {
                status == "CREATE_FAILED" || status == "ROLLBACK_COMPLETE" || status == "ROLLBACK_FAILED"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSubmission {
    Submitted,
    NoChanges,
}

pub trait StackService {
    fn validate_template(&self, template_body: &str) -> Result<(), IngestError>;

    fn stack_state(&self, stack_name: &str) -> Result<StackState, IngestError>;

    fn create_stack(&self, request: &StackRequest) -> Result<(), IngestError>;

    fn update_stack(&self, request: &StackRequest) -> Result<StackSubmission, IngestError>;

    fn delete_stack(&self, stack_name: &str) -> Result<(), IngestError>;
}

pub trait FunctionService {
    /// Points the function at the uploaded package and publishes a version.
    fn publish_code(
        &self,
        function_name: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Option<String>, IngestError>;
}

pub trait Packager {
    /// Builds the deployment archive and returns its path.
    fn build_package(&self) -> Result<PathBuf, IngestError>;
}
