use std::path::PathBuf;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use csv_ingest_core::contract::{data_bucket, source_bucket, PACKAGE_OBJECT_KEY};
use csv_ingest_core::error::IngestError;

use crate::cli::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Profile(String),
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    DefaultChain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub region: Option<String>,
    pub account: String,
    pub credentials: CredentialSource,
    pub template_path: PathBuf,
    pub data_dir: PathBuf,
    pub build_dir: PathBuf,
    pub target: String,
}

impl DeployConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, IngestError> {
        let account = non_empty(&settings.account)
            .ok_or_else(|| IngestError::Local("AWS_ACCOUNT must be configured".to_string()))?;

        let credentials = match (
            non_empty(&settings.profile),
            non_empty(&settings.access_key_id),
            non_empty(&settings.secret_access_key),
        ) {
            (Some(profile), _, _) => CredentialSource::Profile(profile),
            (None, Some(access_key_id), Some(secret_access_key)) => CredentialSource::Static {
                access_key_id,
                secret_access_key,
                session_token: non_empty(&settings.session_token),
            },
            _ => CredentialSource::DefaultChain,
        };

        Ok(Self {
            region: non_empty(&settings.region),
            account,
            credentials,
            template_path: settings.template.clone(),
            data_dir: settings.data_dir.clone(),
            build_dir: settings.build_dir.clone(),
            target: settings.target.clone(),
        })
    }

    pub fn source_bucket(&self) -> String {
        source_bucket(&self.account)
    }

    pub fn data_bucket(&self) -> String {
        data_bucket(&self.account)
    }

    pub fn package_path(&self) -> PathBuf {
        self.build_dir.join(PACKAGE_OBJECT_KEY)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Builds the SDK configuration shared by every client of one invocation.
pub async fn load_sdk_config(config: &DeployConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    loader = match &config.credentials {
        CredentialSource::Profile(name) => loader.profile_name(name),
        CredentialSource::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } => loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            session_token.clone(),
            None,
            "deploy-environment",
        )),
        CredentialSource::DefaultChain => loader,
    };

    loader.load().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            region: Some("eu-west-1".to_string()),
            account: Some(" 123456789012 ".to_string()),
            profile: None,
            access_key_id: Some("AKIAEXAMPLE".to_string()),
            secret_access_key: Some("secret".to_string()),
            session_token: Some(String::new()),
            template: PathBuf::from("stack.yml"),
            data_dir: PathBuf::from("data"),
            build_dir: PathBuf::from("build"),
            target: "x86_64-unknown-linux-gnu".to_string(),
        }
    }

    #[test]
    fn explicit_keys_are_used_without_profile() {
        let config = DeployConfig::from_settings(&settings()).expect("config should load");

        assert_eq!(config.account, "123456789012");
        assert_eq!(
            config.credentials,
            CredentialSource::Static {
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            }
        );
        assert_eq!(config.source_bucket(), "lambda-source-123456789012");
        assert_eq!(config.data_bucket(), "data-storage-123456789012");
        assert_eq!(config.package_path(), PathBuf::from("build/lambda.zip"));
    }

    #[test]
    fn profile_takes_precedence_over_keys() {
        let mut settings = settings();
        settings.profile = Some("ops".to_string());

        let config = DeployConfig::from_settings(&settings).expect("config should load");
        assert_eq!(config.credentials, CredentialSource::Profile("ops".to_string()));
    }

    #[test]
    fn partial_keys_fall_back_to_default_chain() {
        let mut settings = settings();
        settings.secret_access_key = None;

        let config = DeployConfig::from_settings(&settings).expect("config should load");
        assert_eq!(config.credentials, CredentialSource::DefaultChain);
    }

    #[test]
    fn missing_account_is_rejected() {
        let mut settings = settings();
        settings.account = Some("  ".to_string());

        let error = DeployConfig::from_settings(&settings).expect_err("config should fail");
        assert!(error.to_string().contains("AWS_ACCOUNT"));
    }
}
