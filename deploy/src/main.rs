mod aws;
mod cli;
mod cloud;
mod config;
mod package;
mod plan;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{info, warn};

use crate::aws::{CloudFormationStacks, LambdaFunctions, S3ArtifactStore};
use crate::cli::{Cli, WRONG_COMMAND};
use crate::config::{load_sdk_config, DeployConfig};
use crate::package::LambdaPackager;
use crate::plan::{plan_for, Invocation, Orchestrator, StepOutcome};

// Every outcome, including usage mistakes and failed steps, ends with exit
// status 0; the printed lines are the result.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .without_time()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            if let Err(print_error) = error.print() {
                warn!(error = %print_error, "failed to print argument error");
            }
            if !matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                println!("{WRONG_COMMAND}");
            }
            return;
        }
    };

    let steps = match plan_for(cli.command.as_ref()) {
        Invocation::Usage(text) => {
            println!("{text}");
            return;
        }
        Invocation::Plan(steps) => steps,
    };

    let config = match DeployConfig::from_settings(&cli.settings) {
        Ok(config) => config,
        Err(error) => {
            println!("Error: {error}.");
            return;
        }
    };

    let sdk_config = load_sdk_config(&config).await;
    let store = S3ArtifactStore {
        region: sdk_config.region().map(|region| region.to_string()),
        s3_client: aws_sdk_s3::Client::new(&sdk_config),
    };
    let stacks = CloudFormationStacks {
        cloudformation_client: aws_sdk_cloudformation::Client::new(&sdk_config),
    };
    let functions = LambdaFunctions {
        lambda_client: aws_sdk_lambda::Client::new(&sdk_config),
    };
    let packager = LambdaPackager::new(config.build_dir.clone(), config.target.clone());

    let orchestrator = Orchestrator {
        config: &config,
        store: &store,
        stacks: &stacks,
        functions: &functions,
        packager: &packager,
    };

    let reports = orchestrator.run(&steps, |report| {
        if let StepOutcome::Failed(error) = &report.outcome {
            warn!(step = %report.step.label(), kind = error.kind(), "step failed");
        }
        println!("{}", report.message());
    });

    let failed = reports
        .iter()
        .filter(|report| !report.outcome.succeeded())
        .count();
    info!(steps = reports.len(), failed, "deploy finished");
}
