//! AWS account checks.
//!
//! Credentials come from the connected system's configuration; nothing is
//! read from the worker's own environment or instance profile.

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use serde_json::{json, Value};
use vigil_core::check_status::CheckStatus;

use crate::params::{optional_str, require_str};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const S3_BUCKET_ENCRYPTION: &str = "s3_bucket_encryption";

const DEFAULT_REGION: &str = "us-east-1";
const SCAN_TIMEOUT: Duration = Duration::from_secs(60);
const NO_ENCRYPTION_CODE: &str = "ServerSideEncryptionConfigurationNotFoundError";

pub struct AwsPlugin;

#[async_trait]
impl CheckPlugin for AwsPlugin {
    fn id(&self) -> &str {
        "aws"
    }

    fn name(&self) -> &str {
        "AWS checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: S3_BUCKET_ENCRYPTION.to_string(),
            name: "S3 default encryption".to_string(),
            description: "Fails when any S3 bucket lacks default encryption".to_string(),
            target_type: "aws_account".to_string(),
            parameters: vec![ParameterDefinition::optional(
                "bucket",
                "string",
                None,
                "Check only this bucket instead of every bucket",
            )],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != S3_BUCKET_ENCRYPTION {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let account = match AwsAccount::from_context(ctx) {
            Ok(account) => account,
            Err(e) => return CheckOutcome::error(e),
        };
        let only = match optional_str(ctx, "bucket") {
            Ok(bucket) => bucket.map(str::to_string),
            Err(e) => return CheckOutcome::error(e),
        };

        let client = account.client();
        let timeout = ctx.budget(SCAN_TIMEOUT);
        match tokio::time::timeout(timeout, scan(&client, only)).await {
            Ok(Ok(buckets)) => summarize(&account.region, &buckets),
            Ok(Err(e)) => CheckOutcome::failed(json!({
                "region": account.region,
                "error": e.to_string(),
            }))
            .with_error(e),
            Err(_) => {
                let error = CheckError::Timeout(timeout);
                CheckOutcome::failed(json!({
                    "region": account.region,
                    "error": error.to_string(),
                }))
                .with_error(error)
            }
        }
    }
}

struct AwsAccount {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    region: String,
    endpoint_url: Option<String>,
}

impl AwsAccount {
    fn from_context(ctx: &ExecutionContext) -> Result<Self, CheckError> {
        let required = |key: &str| {
            require_str(ctx, key)
                .map(str::to_string)
                .map_err(|_| CheckError::InvalidConfig(format!("{key} is required")))
        };
        Ok(Self {
            access_key_id: required("access_key_id")?,
            secret_access_key: required("secret_access_key")?,
            session_token: optional_str(ctx, "session_token")?.map(str::to_string),
            region: optional_str(ctx, "region")?
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
            endpoint_url: optional_str(ctx, "endpoint_url")?.map(str::to_string),
        })
    }

    fn client(&self) -> aws_sdk_s3::Client {
        let credentials = Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            self.session_token.clone(),
            None,
            "connected-system",
        );
        let mut config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials);
        // S3-compatible endpoints (MinIO, LocalStack) need path-style URLs.
        if let Some(endpoint) = &self.endpoint_url {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }
        aws_sdk_s3::Client::from_conf(config.build())
    }
}

/// Default-encryption state of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketEncryption {
    Encrypted { algorithm: String },
    Unencrypted,
    /// The bucket could not be inspected.
    Unknown { error: String },
}

async fn scan(
    client: &aws_sdk_s3::Client,
    only: Option<String>,
) -> Result<Vec<(String, BucketEncryption)>, CheckError> {
    let names = match only {
        Some(bucket) => vec![bucket],
        None => {
            let listed = client.list_buckets().send().await.map_err(|e| {
                CheckError::Transport(format!("ListBuckets failed: {}", DisplayErrorContext(&e)))
            })?;
            listed
                .buckets()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect()
        }
    };

    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let state = match client.get_bucket_encryption().bucket(&name).send().await {
            Ok(output) => {
                let algorithm = output
                    .server_side_encryption_configuration()
                    .and_then(|config| config.rules().first())
                    .and_then(|rule| rule.apply_server_side_encryption_by_default())
                    .map(|default| default.sse_algorithm().as_str().to_string());
                match algorithm {
                    Some(algorithm) => BucketEncryption::Encrypted { algorithm },
                    None => BucketEncryption::Unencrypted,
                }
            }
            Err(e) if e.as_service_error().and_then(|se| se.code()) == Some(NO_ENCRYPTION_CODE) => {
                BucketEncryption::Unencrypted
            }
            Err(e) => {
                tracing::warn!(bucket = %name, error = %DisplayErrorContext(&e), "GetBucketEncryption failed");
                BucketEncryption::Unknown {
                    error: DisplayErrorContext(&e).to_string(),
                }
            }
        };
        results.push((name, state));
    }
    Ok(results)
}

/// `Success` only when every bucket is encrypted; an uninspectable bucket
/// counts against the account.
pub fn summarize(region: &str, buckets: &[(String, BucketEncryption)]) -> CheckOutcome {
    let mut unencrypted = Vec::new();
    let mut errors = Vec::new();
    for (name, state) in buckets {
        match state {
            BucketEncryption::Encrypted { .. } => {}
            BucketEncryption::Unencrypted => unencrypted.push(Value::from(name.as_str())),
            BucketEncryption::Unknown { error } => {
                errors.push(json!({"bucket": name, "error": error}));
            }
        }
    }
    let status = if unencrypted.is_empty() && errors.is_empty() {
        CheckStatus::Success
    } else {
        CheckStatus::Failed
    };

    CheckOutcome::new(
        status,
        &json!({
            "region": region,
            "buckets_checked": buckets.len(),
            "unencrypted_buckets": unencrypted,
            "errors": errors,
        }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
