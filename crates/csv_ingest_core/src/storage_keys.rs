pub const PROCESSED_SUFFIX: &str = ".PROCESSED";

/// Key a source object is renamed to once its rows are in the table.
pub fn processed_object_key(key: &str) -> String {
    format!("{key}{PROCESSED_SUFFIX}")
}

pub fn is_processed_key(key: &str) -> bool {
    key.ends_with(PROCESSED_SUFFIX)
}

/// `bucket/key` copy source with the key percent-encoded as S3 expects.
pub fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    format!("{bucket}/{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_processed_key() {
        assert_eq!(processed_object_key("sales.csv"), "sales.csv.PROCESSED");
        assert!(is_processed_key("sales.csv.PROCESSED"));
        assert!(!is_processed_key("sales.csv"));
    }

    #[test]
    fn copy_source_encodes_reserved_characters() {
        assert_eq!(
            copy_source("data-storage-1", "in/sales 2020.csv"),
            "data-storage-1/in/sales%202020.csv"
        );
    }
}
