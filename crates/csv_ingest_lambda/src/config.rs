pub const DATA_BUCKET_VAR: &str = "DATA_BUCKET";
pub const DATA_TABLE_VAR: &str = "DATA_TABLE";
pub const MARK_PROCESSED_VAR: &str = "MARK_PROCESSED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    pub data_bucket: String,
    pub data_table: String,
    /// Rename each source object to `<key>.PROCESSED` after its rows are written.
    pub mark_processed: bool,
}

impl FunctionConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| format!("{name} must be configured"))
        };

        let mark_processed = match lookup(MARK_PROCESSED_VAR) {
            None => true,
            Some(value) => parse_flag(&value)
                .ok_or_else(|| format!("{MARK_PROCESSED_VAR} must be true or false, got {value:?}"))?,
        };

        Ok(Self {
            data_bucket: required(DATA_BUCKET_VAR)?,
            data_table: required(DATA_TABLE_VAR)?,
            mark_processed,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
