pub const STACK_NAME: &str = "data-processing";
pub const FUNCTION_NAME: &str = "process_csv";
pub const PACKAGE_OBJECT_KEY: &str = "lambda.zip";
pub const TEMPLATE_FILE: &str = "stack.yml";
pub const DATA_DIR: &str = "data";
pub const BUILD_DIR: &str = "build";

pub const STACK_CAPABILITY: &str = "CAPABILITY_NAMED_IAM";
pub const BUCKET_NAME_PARAMETER: &str = "BucketName";
pub const STACK_CREATE_TIMEOUT_MINUTES: i32 = 10;

pub const ID_FIELD: &str = "ID";
pub const TIMESTAMP_FIELD: &str = "TIMESTAMP";
pub const ID_COLUMN: usize = 0;
pub const TIMESTAMP_COLUMN: usize = 3;
pub const FIELD_DELIMITER: u8 = b';';
pub const QUOTE_CHAR: u8 = b'"';
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// What CloudFormation should do with a stack whose creation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailurePolicy {
    DoNothing,
    Rollback,
    Delete,
}

impl OnFailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DoNothing => "DO_NOTHING",
            Self::Rollback => "ROLLBACK",
            Self::Delete => "DELETE",
        }
    }
}

/// Everything a create or update submission carries besides the template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_body: String,
    pub capabilities: Vec<String>,
    pub parameters: Vec<(String, String)>,
    pub timeout_minutes: Option<i32>,
    pub on_failure: Option<OnFailurePolicy>,
}

impl StackRequest {
    /// Request for the fixed data-processing stack, binding the data bucket name.
    pub fn for_account(account: &str, template_body: impl Into<String>) -> Self {
        Self {
            stack_name: STACK_NAME.to_string(),
            template_body: template_body.into(),
            capabilities: vec![STACK_CAPABILITY.to_string()],
            parameters: vec![(BUCKET_NAME_PARAMETER.to_string(), data_bucket(account))],
            timeout_minutes: Some(STACK_CREATE_TIMEOUT_MINUTES),
            on_failure: Some(OnFailurePolicy::DoNothing),
        }
    }
}

/// Bucket holding the function deployment package.
pub fn source_bucket(account: &str) -> String {
    format!("lambda-source-{}", account.trim())
}

/// Bucket receiving the delimited files to ingest.
pub fn data_bucket(account: &str) -> String {
    format!("data-storage-{}", account.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_are_account_scoped() {
        assert_eq!(source_bucket("123456789012"), "lambda-source-123456789012");
        assert_eq!(data_bucket(" 123456789012 "), "data-storage-123456789012");
    }

    #[test]
    fn stack_request_binds_data_bucket_parameter() {
        let request = StackRequest::for_account("42", "Resources: {}");

        assert_eq!(request.stack_name, "data-processing");
        assert_eq!(request.capabilities, vec!["CAPABILITY_NAMED_IAM"]);
        assert_eq!(
            request.parameters,
            vec![("BucketName".to_string(), "data-storage-42".to_string())]
        );
        assert_eq!(request.timeout_minutes, Some(10));
        assert_eq!(
            request.on_failure.map(OnFailurePolicy::as_str),
            Some("DO_NOTHING")
        );
    }
}
