use std::collections::HashMap;

use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use csv_ingest_core::error::{classify_provider_error, IngestError};
use csv_ingest_core::record::{Item, ItemValue};
use csv_ingest_core::storage_keys::copy_source;
use csv_ingest_lambda::adapters::item_table::ItemTable;
use csv_ingest_lambda::adapters::object_store::SourceStore;
use csv_ingest_lambda::config::FunctionConfig;
use csv_ingest_lambda::handlers::process_file::{handle_event, EventSummary};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

struct S3SourceStore {
    bucket: String,
    s3_client: aws_sdk_s3::Client,
}

impl SourceStore for S3SourceStore {
    fn read_object(&self, key: &str) -> Result<Vec<u8>, IngestError> {
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_object()
                    .bucket(bucket)
                    .key(&object_key)
                    .send()
                    .await
                    .map_err(|error| provider_error("failed to get object from s3", error))?;
                let body = output.body.collect().await.map_err(|error| {
                    IngestError::Provider(format!("failed to read body of {object_key}: {error}"))
                })?;
                Ok(body.into_bytes().to_vec())
            })
        })
    }

    fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), IngestError> {
        let bucket = self.bucket.clone();
        let source = copy_source(&self.bucket, source_key);
        let destination = destination_key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .copy_object()
                    .bucket(bucket)
                    .copy_source(source)
                    .key(destination)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to copy object in s3", error))
            })
        })
    }

    fn delete_object(&self, key: &str) -> Result<(), IngestError> {
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(object_key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to delete object from s3", error))
            })
        })
    }
}

struct DynamoItemTable {
    table_name: String,
    dynamodb_client: aws_sdk_dynamodb::Client,
}

impl ItemTable for DynamoItemTable {
    fn batch_put(&self, items: &[Item]) -> Result<Vec<Item>, IngestError> {
        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(to_attributes(item)))
                .build()
                .map_err(|error| IngestError::Provider(format!("invalid put request: {error}")))?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }

        let table_name = self.table_name.clone();
        let client = self.dynamodb_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .batch_write_item()
                    .request_items(table_name.clone(), requests)
                    .send()
                    .await
                    .map_err(|error| provider_error("failed to batch write items", error))?;

                Ok(output
                    .unprocessed_items()
                    .and_then(|unprocessed| unprocessed.get(&table_name))
                    .map(|requests| {
                        requests
                            .iter()
                            .filter_map(WriteRequest::put_request)
                            .map(|put| from_attributes(put.item()))
                            .collect()
                    })
                    .unwrap_or_default())
            })
        })
    }
}

fn to_attributes(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| {
            let attribute = match value {
                ItemValue::Number(number) => AttributeValue::N(number.to_string()),
                ItemValue::Text(text) => AttributeValue::S(text.clone()),
            };
            (name.clone(), attribute)
        })
        .collect()
}

fn from_attributes(attributes: &HashMap<String, AttributeValue>) -> Item {
    attributes
        .iter()
        .filter_map(|(name, attribute)| {
            let value = match attribute {
                AttributeValue::N(number) => ItemValue::Number(number.parse().ok()?),
                AttributeValue::S(text) => ItemValue::Text(text.clone()),
                _ => return None,
            };
            Some((name.clone(), value))
        })
        .collect()
}

fn provider_error<E, R>(context: &str, error: SdkError<E, R>) -> IngestError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{context}: {}", DisplayErrorContext(&error));
    if matches!(error, SdkError::TimeoutError(_)) {
        return IngestError::Timeout(message);
    }
    classify_provider_error(error.code(), message)
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<EventSummary, Error> {
    let config = FunctionConfig::from_env().map_err(Error::from)?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = S3SourceStore {
        bucket: config.data_bucket.clone(),
        s3_client: aws_sdk_s3::Client::new(&aws_config),
    };
    let table = DynamoItemTable {
        table_name: config.data_table.clone(),
        dynamodb_client: aws_sdk_dynamodb::Client::new(&aws_config),
    };

    handle_event(&event.payload, config.mark_processed, &store, &table).map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    lambda_runtime::run(service_fn(handle_request)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_use_number_and_string_types() {
        let item = Item::from([
            ("ID".to_string(), ItemValue::Number(101)),
            ("name".to_string(), ItemValue::Text("Name".to_string())),
        ]);

        let attributes = to_attributes(&item);
        assert_eq!(attributes["ID"], AttributeValue::N("101".to_string()));
        assert_eq!(attributes["name"], AttributeValue::S("Name".to_string()));
        assert_eq!(from_attributes(&attributes), item);
    }
}
