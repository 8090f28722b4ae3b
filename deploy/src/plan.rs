//! Ordered provisioning steps behind each deploy command.
//!
//! Every step first checks whether its effect is already in place and skips
//! itself if so, which makes rerunning a partially failed command safe. A
//! failed step never aborts the run; only steps that need its output are
//! blocked. There is no rollback.

use std::fs;

use csv_ingest_core::contract::{StackRequest, FUNCTION_NAME, PACKAGE_OBJECT_KEY, STACK_NAME};
use csv_ingest_core::error::IngestError;

use crate::cli::{Commands, MISSING_FILE, USAGE};
use crate::cloud::{
    ArtifactStore, FunctionService, Packager, StackService, StackState, StackSubmission,
};
use crate::config::DeployConfig;
use crate::package::file_fingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    CreateSourceBucket,
    BuildPackage,
    UploadPackage,
    PublishFunction,
    CreateStack,
    UpdateStack,
    DeleteSourceBucket,
    EmptyDataBucket,
    DeleteStack,
    UploadDataFile(String),
}

impl ProvisionStep {
    pub fn label(&self) -> String {
        match self {
            Self::CreateSourceBucket => "create source bucket".to_string(),
            Self::BuildPackage => "build deployment package".to_string(),
            Self::UploadPackage => "upload deployment package".to_string(),
            Self::PublishFunction => "publish lambda".to_string(),
            Self::CreateStack => "create stack".to_string(),
            Self::UpdateStack => "update stack".to_string(),
            Self::DeleteSourceBucket => "delete source bucket".to_string(),
            Self::EmptyDataBucket => "empty data bucket".to_string(),
            Self::DeleteStack => "delete stack".to_string(),
            Self::UploadDataFile(name) => format!("upload {name}"),
        }
    }

    fn prerequisite(&self) -> Option<ProvisionStep> {
        match self {
            Self::UploadPackage => Some(Self::BuildPackage),
            Self::PublishFunction => Some(Self::UploadPackage),
            _ => None,
        }
    }
}

/// What an invocation resolves to before any cloud call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Usage(&'static str),
    Plan(Vec<ProvisionStep>),
}

pub fn plan_for(command: Option<&Commands>) -> Invocation {
    use ProvisionStep::*;

    let steps = match command {
        None | Some(Commands::Help) => return Invocation::Usage(USAGE),
        Some(Commands::Upload { file: None }) => return Invocation::Usage(MISSING_FILE),
        Some(Commands::Upload { file: Some(name) }) => vec![UploadDataFile(name.clone())],
        Some(Commands::Create { stack_only: true }) => vec![CreateStack],
        Some(Commands::Create { stack_only: false }) => {
            vec![CreateSourceBucket, BuildPackage, UploadPackage, CreateStack]
        }
        Some(Commands::Update { stack_only: true }) => vec![UpdateStack],
        Some(Commands::Update { stack_only: false }) => {
            vec![BuildPackage, UploadPackage, PublishFunction, UpdateStack]
        }
        Some(Commands::Delete { stack_only: true }) => vec![DeleteStack],
        Some(Commands::Delete { stack_only: false }) => {
            vec![DeleteSourceBucket, EmptyDataBucket, DeleteStack]
        }
        Some(Commands::Lambda) => vec![BuildPackage, UploadPackage, PublishFunction],
    };
    Invocation::Plan(steps)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done(String),
    AlreadyDone(String),
    Blocked(String),
    Failed(IngestError),
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Done(_) | Self::AlreadyDone(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: ProvisionStep,
    pub outcome: StepOutcome,
}

impl StepReport {
    /// Operator-facing line for this step.
    pub fn message(&self) -> String {
        match &self.outcome {
            StepOutcome::Done(message) => message.clone(),
            StepOutcome::AlreadyDone(message) => format!("{message} Nothing to do."),
            StepOutcome::Blocked(reason) => {
                format!("Skipped {}: {reason}.", self.step.label())
            }
            StepOutcome::Failed(error) => {
                format!("Error: {} failed. Exception: {error}.", self.step.label())
            }
        }
    }
}

pub struct Orchestrator<'a> {
    pub config: &'a DeployConfig,
    pub store: &'a dyn ArtifactStore,
    pub stacks: &'a dyn StackService,
    pub functions: &'a dyn FunctionService,
    pub packager: &'a dyn Packager,
}

impl Orchestrator<'_> {
    /// Runs `plan` in order, handing each report to `on_report` as it lands.
    pub fn run(
        &self,
        plan: &[ProvisionStep],
        mut on_report: impl FnMut(&StepReport),
    ) -> Vec<StepReport> {
        let mut reports: Vec<StepReport> = Vec::with_capacity(plan.len());

        for step in plan {
            let blocked_by = step.prerequisite().filter(|prerequisite| {
                reports
                    .iter()
                    .any(|report| &report.step == prerequisite && !report.outcome.succeeded())
            });

            let outcome = match blocked_by {
                Some(prerequisite) => {
                    StepOutcome::Blocked(format!("{} did not complete", prerequisite.label()))
                }
                None => self.execute(step).unwrap_or_else(StepOutcome::Failed),
            };

            let report = StepReport {
                step: step.clone(),
                outcome,
            };
            on_report(&report);
            reports.push(report);
        }

        reports
    }

    fn execute(&self, step: &ProvisionStep) -> Result<StepOutcome, IngestError> {
        match step {
            ProvisionStep::CreateSourceBucket => self.create_source_bucket(),
            ProvisionStep::BuildPackage => {
                let path = self.packager.build_package()?;
                Ok(StepOutcome::Done(format!(
                    "Lambda deployment package built at {}!",
                    path.display()
                )))
            }
            ProvisionStep::UploadPackage => self.upload_package(),
            ProvisionStep::PublishFunction => {
                let version = self.functions.publish_code(
                    FUNCTION_NAME,
                    &self.config.source_bucket(),
                    PACKAGE_OBJECT_KEY,
                )?;
                Ok(StepOutcome::Done(match version {
                    Some(version) => format!("Lambda function published as version {version}!"),
                    None => "Lambda function published!".to_string(),
                }))
            }
            ProvisionStep::CreateStack => self.create_stack(),
            ProvisionStep::UpdateStack => self.update_stack(),
            ProvisionStep::DeleteSourceBucket => self.delete_source_bucket(),
            ProvisionStep::EmptyDataBucket => self.empty_data_bucket(),
            ProvisionStep::DeleteStack => self.delete_stack(),
            ProvisionStep::UploadDataFile(name) => self.upload_data_file(name),
        }
    }

    fn create_source_bucket(&self) -> Result<StepOutcome, IngestError> {
        let bucket = self.config.source_bucket();
        if self.store.bucket_exists(&bucket)? {
            return Ok(StepOutcome::AlreadyDone(format!(
                "S3 bucket {bucket} already exists."
            )));
        }
        self.store.create_bucket(&bucket)?;
        Ok(StepOutcome::Done(format!("Created S3 bucket {bucket}!")))
    }

    fn upload_package(&self) -> Result<StepOutcome, IngestError> {
        let bucket = self.config.source_bucket();
        let path = self.config.package_path();
        let local = file_fingerprint(&path)?;

        if self
            .store
            .object_fingerprint(&bucket, PACKAGE_OBJECT_KEY)?
            .is_some_and(|remote| remote == local)
        {
            return Ok(StepOutcome::AlreadyDone(format!(
                "Deployment package {local} is already in {bucket}."
            )));
        }

        self.store
            .upload_file(&bucket, PACKAGE_OBJECT_KEY, &path, Some(&local))?;
        Ok(StepOutcome::Done(
            "Lambda deployment package uploaded to S3!".to_string(),
        ))
    }

    fn stack_request(&self) -> Result<StackRequest, IngestError> {
        let path = &self.config.template_path;
        let template = fs::read_to_string(path).map_err(|error| {
            IngestError::from_io(format!("failed to read {}", path.display()), error)
        })?;
        self.stacks.validate_template(&template)?;
        Ok(StackRequest::for_account(&self.config.account, template))
    }

    fn create_stack(&self) -> Result<StepOutcome, IngestError> {
        let request = self.stack_request()?;
        let state = self.stacks.stack_state(STACK_NAME)?;
        if state.is_failed_creation() {
            return Err(IngestError::Provider(format!(
                "stack {STACK_NAME} is left over from a failed creation ({state:?}); delete it first"
            )));
        }
        if let StackState::Present { status } = state {
            return Ok(StepOutcome::AlreadyDone(format!(
                "Stack {STACK_NAME} already exists ({status})."
            )));
        }

        self.stacks.create_stack(&request)?;
        Ok(StepOutcome::Done(
            "Creating CloudFormation stack. Check the service console for more information."
                .to_string(),
        ))
    }

    fn update_stack(&self) -> Result<StepOutcome, IngestError> {
        let request = self.stack_request()?;
        match self.stacks.update_stack(&request)? {
            StackSubmission::Submitted => Ok(StepOutcome::Done(
                "Updating CloudFormation stack. Check the service console for more information."
                    .to_string(),
            )),
            StackSubmission::NoChanges => Ok(StepOutcome::AlreadyDone(format!(
                "Stack {STACK_NAME} is already up to date."
            ))),
        }
    }

    fn delete_source_bucket(&self) -> Result<StepOutcome, IngestError> {
        let bucket = self.config.source_bucket();
        if !self.store.bucket_exists(&bucket)? {
            return Ok(StepOutcome::AlreadyDone(format!(
                "S3 bucket {bucket} does not exist."
            )));
        }
        self.store.empty_bucket(&bucket)?;
        self.store.delete_bucket(&bucket)?;
        Ok(StepOutcome::Done(format!("Deleted S3 bucket {bucket}!")))
    }

    fn empty_data_bucket(&self) -> Result<StepOutcome, IngestError> {
        let bucket = self.config.data_bucket();
        if !self.store.bucket_exists(&bucket)? {
            return Ok(StepOutcome::AlreadyDone(format!(
                "S3 bucket {bucket} does not exist."
            )));
        }
        let deleted = self.store.empty_bucket(&bucket)?;
        Ok(StepOutcome::Done(format!(
            "Deleted {deleted} S3 objects from {bucket}!"
        )))
    }

    fn delete_stack(&self) -> Result<StepOutcome, IngestError> {
        if self.stacks.stack_state(STACK_NAME)? == StackState::Absent {
            return Ok(StepOutcome::AlreadyDone(format!(
                "Stack {STACK_NAME} does not exist."
            )));
        }
        self.stacks.delete_stack(STACK_NAME)?;
        Ok(StepOutcome::Done(
            "Deleting CloudFormation stack. Check the service console for more information."
                .to_string(),
        ))
    }

    fn upload_data_file(&self, name: &str) -> Result<StepOutcome, IngestError> {
        let dir = &self.config.data_dir;
        let listed = fs::read_dir(dir)
            .map_err(|error| IngestError::from_io(format!("failed to list {}", dir.display()), error))?
            .filter_map(Result::ok)
            .any(|entry| entry.file_name() == name && entry.path().is_file());
        if !listed {
            return Err(IngestError::NotFound(format!(
                "file {name} does not exist in {}",
                dir.display()
            )));
        }

        let bucket = self.config.data_bucket();
        self.store.upload_file(&bucket, name, &dir.join(name), None)?;
        Ok(StepOutcome::Done(format!("Uploaded {name} with success!")))
    }
}
