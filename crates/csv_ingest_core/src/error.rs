//! Error taxonomy shared by the function and the deploy tool.

use thiserror::Error;

/// Failure of a single ingestion or provisioning operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    /// The addressed bucket, object, table, stack or function does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's credentials are not allowed to perform the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A line of the input could not be coerced into an item.
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the source document.
        line: usize,
        reason: String,
    },

    /// The provider did not complete the call in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other remote failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Filesystem or subprocess failure on the operator's machine.
    #[error("local error: {0}")]
    Local(String),
}

impl IngestError {
    pub fn malformed_row(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            line,
            reason: reason.into(),
        }
    }

    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::MalformedRow { .. } => "malformed_row",
            Self::Timeout(_) => "timeout",
            Self::Provider(_) => "provider",
            Self::Local(_) => "local",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Wraps a filesystem or subprocess error, keeping not-found and permission kinds.
    pub fn from_io(context: impl std::fmt::Display, error: std::io::Error) -> Self {
        let message = format!("{context}: {error}");
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(message),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            std::io::ErrorKind::TimedOut => Self::Timeout(message),
            _ => Self::Local(message),
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchKey",
    "NoSuchBucket",
    "NotFound",
    "ResourceNotFoundException",
];

const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

const TIMEOUT_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "ThrottlingException",
    "Throttling",
    "ProvisionedThroughputExceededException",
    "SlowDown",
];

/// Maps a provider error code (and its message) to an error kind.
///
/// CloudFormation reports a missing stack as a `ValidationError` whose message
/// ends in "does not exist", so the message is consulted when the code alone
/// is ambiguous.
pub fn classify_provider_error(code: Option<&str>, message: impl Into<String>) -> IngestError {
    let message = message.into();
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => IngestError::NotFound(message),
        Some(code) if PERMISSION_CODES.contains(&code) => IngestError::PermissionDenied(message),
        Some(code) if TIMEOUT_CODES.contains(&code) => IngestError::Timeout(message),
        Some("ValidationError") if message.contains("does not exist") => {
            IngestError::NotFound(message)
        }
        _ => IngestError::Provider(message),
    }
}
