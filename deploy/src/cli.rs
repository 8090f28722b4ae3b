use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use csv_ingest_core::contract::{BUILD_DIR, DATA_DIR, TEMPLATE_FILE};

pub const USAGE: &str = "Available commands:\n\n\
    \t>create: Deploy stack\n\n\
    \t>update: Update stack and lambda\n\n\
    \t>delete: Delete stack, lambda and S3 bucket\n\n\
    \t>lambda: Update lambda\n\n\
    \t>upload <file>: Upload a file from the data directory for processing";

pub const WRONG_COMMAND: &str = "Wrong command! Type 'help' to see available options.";
pub const MISSING_FILE: &str = "Missing parameter: file!";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "deploy",
    about = "Deploy tool for the CSV ingestion stack",
    long_about = "Builds and publishes the CSV processing Lambda, manages its\n\
                  source bucket, and creates, updates or deletes the\n\
                  CloudFormation stack described by stack.yml.",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// AWS region for every call
    #[arg(long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,
    /// Account id used to name the buckets
    #[arg(long, env = "AWS_ACCOUNT", global = true)]
    pub account: Option<String>,
    /// Named credential profile; takes precedence over explicit keys
    #[arg(long = "aws-profile", env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, global = true)]
    pub access_key_id: Option<String>,
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    pub secret_access_key: Option<String>,
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true, global = true)]
    pub session_token: Option<String>,
    /// CloudFormation template file
    #[arg(long, default_value = TEMPLATE_FILE, global = true)]
    pub template: PathBuf,
    /// Directory `upload` picks files from
    #[arg(long, default_value = DATA_DIR, global = true)]
    pub data_dir: PathBuf,
    /// Directory the deployment package is built in
    #[arg(long, default_value = BUILD_DIR, global = true)]
    pub build_dir: PathBuf,
    /// Compilation target triple for the Lambda binary
    #[arg(long, default_value = "x86_64-unknown-linux-gnu", global = true)]
    pub target: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Deploy stack: source bucket, function package, stack creation
    Create {
        /// Only submit the stack
        #[arg(long)]
        stack_only: bool,
    },
    /// Update stack and lambda
    Update {
        /// Only submit the stack
        #[arg(long)]
        stack_only: bool,
    },
    /// Delete stack, lambda and S3 bucket
    Delete {
        /// Only delete the stack
        #[arg(long)]
        stack_only: bool,
    },
    /// Rebuild, upload and publish the lambda only
    Lambda,
    /// Upload a file from the data directory for processing
    Upload {
        /// File name inside the data directory
        file: Option<String>,
    },
    /// Print available commands
    Help,
}
