use std::collections::HashMap;
use std::path::Path;

use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, Delete,
    ObjectIdentifier,
};
use csv_ingest_core::contract::StackRequest;
use csv_ingest_core::error::{classify_provider_error, IngestError};
use tracing::debug;

use crate::cloud::{
    ArtifactStore, FunctionService, StackService, StackState, StackSubmission,
    FINGERPRINT_METADATA_KEY,
};

/// Largest key count a single `DeleteObjects` call accepts.
const DELETE_BATCH_LIMIT: usize = 1000;
const DEFAULT_REGION: &str = "us-east-1";
const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

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

pub struct S3ArtifactStore {
    pub region: Option<String>,
    pub s3_client: aws_sdk_s3::Client,
}

impl ArtifactStore for S3ArtifactStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, IngestError> {
        let bucket = bucket.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.head_bucket().bucket(bucket).send().await {
                    Ok(_) => Ok(true),
                    Err(error) => match provider_error("failed to head s3 bucket", error) {
                        error if error.is_not_found() => Ok(false),
                        error => Err(error),
                    },
                }
            })
        })
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), IngestError> {
        let bucket = bucket.to_string();
        let client = self.s3_client.clone();
        // us-east-1 rejects an explicit location constraint.
        let location = self
            .region
            .as_deref()
            .filter(|region| *region != DEFAULT_REGION)
            .map(|region| {
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build()
            });

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .create_bucket()
                    .bucket(bucket)
                    .acl(BucketCannedAcl::Private)
                    .set_create_bucket_configuration(location)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to create s3 bucket", error))
            })
        })
    }

    fn empty_bucket(&self, bucket: &str) -> Result<usize, IngestError> {
        let bucket = bucket.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut keys = Vec::new();
                let mut pages = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .into_paginator()
                    .send();
                while let Some(page) = pages.next().await {
                    let page =
                        page.map_err(|error| provider_error("failed to list s3 objects", error))?;
                    keys.extend(
                        page.contents()
                            .iter()
                            .filter_map(|object| object.key().map(str::to_string)),
                    );
                }

                for chunk in keys.chunks(DELETE_BATCH_LIMIT) {
                    let objects = chunk
                        .iter()
                        .map(|key| ObjectIdentifier::builder().key(key).build())
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|error| {
                            IngestError::Provider(format!("invalid object identifier: {error}"))
                        })?;
                    let delete = Delete::builder()
                        .set_objects(Some(objects))
                        .quiet(true)
                        .build()
                        .map_err(|error| {
                            IngestError::Provider(format!("invalid delete request: {error}"))
                        })?;
                    client
                        .delete_objects()
                        .bucket(&bucket)
                        .delete(delete)
                        .send()
                        .await
                        .map_err(|error| provider_error("failed to delete s3 objects", error))?;
                    debug!(bucket = %bucket, count = chunk.len(), "deleted object batch");
                }

                Ok(keys.len())
            })
        })
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), IngestError> {
        let bucket = bucket.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to delete s3 bucket", error))
            })
        })
    }

    fn object_fingerprint(&self, bucket: &str, key: &str) -> Result<Option<String>, IngestError> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.head_object().bucket(bucket).key(key).send().await {
                    Ok(output) => Ok(output
                        .metadata()
                        .and_then(|metadata| metadata.get(FINGERPRINT_METADATA_KEY))
                        .cloned()),
                    Err(error) => match provider_error("failed to head s3 object", error) {
                        error if error.is_not_found() => Ok(None),
                        error => Err(error),
                    },
                }
            })
        })
    }

    fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        fingerprint: Option<&str>,
    ) -> Result<(), IngestError> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let path = path.to_path_buf();
        let metadata = fingerprint.map(|value| {
            HashMap::from([(FINGERPRINT_METADATA_KEY.to_string(), value.to_string())])
        });
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let body = ByteStream::from_path(&path).await.map_err(|error| {
                    IngestError::Local(format!("failed to read {}: {error}", path.display()))
                })?;
                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(body)
                    .set_metadata(metadata)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to put object to s3", error))
            })
        })
    }
}

pub struct CloudFormationStacks {
    pub cloudformation_client: aws_sdk_cloudformation::Client,
}

fn stack_parameters(request: &StackRequest) -> Vec<Parameter> {
    request
        .parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn stack_capabilities(request: &StackRequest) -> Vec<Capability> {
    request
        .capabilities
        .iter()
        .map(|capability| Capability::from(capability.as_str()))
        .collect()
}

impl StackService for CloudFormationStacks {
    fn validate_template(&self, template_body: &str) -> Result<(), IngestError> {
        let body = template_body.to_string();
        let client = self.cloudformation_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .validate_template()
                    .template_body(body)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("template validation failed", error))
            })
        })
    }

    fn stack_state(&self, stack_name: &str) -> Result<StackState, IngestError> {
        let stack_name = stack_name.to_string();
        let client = self.cloudformation_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = match client.describe_stacks().stack_name(&stack_name).send().await {
                    Ok(output) => output,
                    Err(error) => {
                        return match provider_error("failed to describe stack", error) {
                            error if error.is_not_found() => Ok(StackState::Absent),
                            error => Err(error),
                        };
                    }
                };

                let status = output
                    .stacks()
                    .iter()
                    .find_map(|stack| stack.stack_status())
                    .map(|status| status.as_str().to_string());
                Ok(match status {
                    None => StackState::Absent,
                    Some(status) if status == "DELETE_COMPLETE" => StackState::Absent,
                    Some(status) => StackState::Present { status },
                })
            })
        })
    }

    fn create_stack(&self, request: &StackRequest) -> Result<(), IngestError> {
        let client = self.cloudformation_client.clone();
        let call = client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_capabilities(Some(stack_capabilities(request)))
            .set_parameters(Some(stack_parameters(request)))
            .set_timeout_in_minutes(request.timeout_minutes)
            .set_on_failure(
                request
                    .on_failure
                    .map(|policy| OnFailure::from(policy.as_str())),
            );

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                call.send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to create stack", error))
            })
        })
    }

    fn update_stack(&self, request: &StackRequest) -> Result<StackSubmission, IngestError> {
        let client = self.cloudformation_client.clone();
        let call = client
            .update_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_capabilities(Some(stack_capabilities(request)))
            .set_parameters(Some(stack_parameters(request)));

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match call.send().await {
                    Ok(_) => Ok(StackSubmission::Submitted),
                    Err(error)
                        if error
                            .message()
                            .is_some_and(|message| message.contains(NO_UPDATES_MESSAGE)) =>
                    {
                        Ok(StackSubmission::NoChanges)
                    }
                    Err(error) => Err(provider_error("failed to update stack", error)),
                }
            })
        })
    }

    fn delete_stack(&self, stack_name: &str) -> Result<(), IngestError> {
        let stack_name = stack_name.to_string();
        let client = self.cloudformation_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_stack()
                    .stack_name(stack_name)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| provider_error("failed to delete stack", error))
            })
        })
    }
}

pub struct LambdaFunctions {
    pub lambda_client: aws_sdk_lambda::Client,
}

impl FunctionService for LambdaFunctions {
    fn publish_code(
        &self,
        function_name: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Option<String>, IngestError> {
        let function_name = function_name.to_string();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let client = self.lambda_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .update_function_code()
                    .function_name(function_name)
                    .s3_bucket(bucket)
                    .s3_key(key)
                    .publish(true)
                    .send()
                    .await
                    .map_err(|error| provider_error("failed to update lambda code", error))?;
                Ok(output.version().map(str::to_string))
            })
        })
    }
}
