use serde_json::Value;

/// One record of an object-created notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub index: usize,
    /// `None` when the record carries no `s3.object.key` string.
    pub key: Option<String>,
}

/// Pulls `Records[*].s3.object.key` out of a storage notification.
///
/// Keys are taken verbatim from the event.
pub fn decode_object_records(event: &Value) -> Result<Vec<ObjectRecord>, String> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| "storage event must include Records array".to_string())?;

    Ok(records
        .iter()
        .enumerate()
        .map(|(index, record)| ObjectRecord {
            index,
            key: record
                .pointer("/s3/object/key")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect())
}
