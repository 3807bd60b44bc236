//! Compatibility with Amplify style `aws-exports` files.
//!
//! Older deployments ship their settings as a flat JSON object using the Amplify key names
//! (`aws_user_pools_id`, `aws_user_files_s3_bucket`, ...). Such a file is picked up as the
//! middle priority source and converted into the nested configuration shape.

use crate::config::Config;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

/// Marker value which the scaffolding writes before a backend is provisioned.
const PLACEHOLDER: &str = "placeholder";

const DEFAULT_API_BASE_URL: &str = "https://api.littlebit.app";

/// The flat Amplify export structure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyExports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_project_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_cognito_identity_pool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_cognito_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_user_pools_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_user_pools_web_client_id: Option<String>,
    #[serde(
        default,
        rename = "aws_appsync_graphqlEndpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_appsync_graphql_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_appsync_region: Option<String>,
    #[serde(
        default,
        rename = "aws_appsync_authenticationType",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_appsync_authentication_type: Option<String>,
    #[serde(
        default,
        rename = "aws_appsync_apiKey",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_appsync_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_user_files_s3_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_user_files_s3_bucket_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_mobile_analytics_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_mobile_analytics_app_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_sqs_queue_url: Option<String>,
}

impl LegacyExports {
    /// Renders a loaded configuration in the export format.
    pub fn from_config(config: &Config) -> Self {
        LegacyExports {
            aws_project_region: Some(config.aws.region.clone()),
            aws_cognito_identity_pool_id: Some(config.aws.cognito.identity_pool_id.clone()),
            aws_cognito_region: Some(config.aws.cognito.region.clone()),
            aws_user_pools_id: Some(config.aws.cognito.user_pool_id.clone()),
            aws_user_pools_web_client_id: Some(config.aws.cognito.client_id.clone()),
            aws_appsync_graphql_endpoint: Some(config.aws.appsync.endpoint.clone()),
            aws_appsync_region: Some(config.aws.appsync.region.clone()),
            aws_appsync_authentication_type: Some(
                config.aws.appsync.authentication_type.as_str().to_string(),
            ),
            aws_appsync_api_key: config.aws.appsync.api_key.clone(),
            aws_user_files_s3_bucket: Some(config.aws.s3.bucket_name.clone()),
            aws_user_files_s3_bucket_region: Some(config.aws.s3.region.clone()),
            aws_mobile_analytics_app_id: None,
            aws_mobile_analytics_app_region: Some(config.aws.region.clone()),
            aws_sqs_queue_url: config.aws.sqs_queue_url.clone(),
        }
    }

    /// Determines if the exports were generated for a real backend.
    pub fn is_provisioned(&self) -> bool {
        let is_real = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|value| !value.is_empty() && value != PLACEHOLDER)
        };

        is_real(&self.aws_user_pools_id) && is_real(&self.aws_user_files_s3_bucket)
    }

    /// Infers the environment from the naming conventions of the bucket and the endpoint.
    pub fn infer_environment(&self) -> &'static str {
        let bucket = self.aws_user_files_s3_bucket.as_deref().unwrap_or_default();
        let endpoint = self
            .aws_appsync_graphql_endpoint
            .as_deref()
            .unwrap_or_default();

        if bucket.contains("-prod-") || endpoint.contains("prod") {
            "production"
        } else if bucket.contains("-staging-") || endpoint.contains("staging") {
            "staging"
        } else {
            "development"
        }
    }

    /// Converts the exports into a partial configuration tree.
    pub fn to_config_tree(&self) -> Value {
        let mut aws = json!({
            "region": self.aws_project_region.as_ref().or(self.aws_cognito_region.as_ref()),
            "cognito": {
                "userPoolId": self.aws_user_pools_id,
                "clientId": self.aws_user_pools_web_client_id,
                "identityPoolId": self.aws_cognito_identity_pool_id,
                "region": self.aws_cognito_region
            },
            "s3": {
                "bucketName": self.aws_user_files_s3_bucket,
                "region": self.aws_user_files_s3_bucket_region
            },
            "appsync": {
                "endpoint": self.aws_appsync_graphql_endpoint,
                "region": self.aws_appsync_region,
                "authenticationType": self.aws_appsync_authentication_type,
                "apiKey": self.aws_appsync_api_key
            }
        });

        if let Some(queue_url) = &self.aws_sqs_queue_url {
            aws["sqsQueueUrl"] = json!(queue_url);
        }

        json!({
            "environment": self.infer_environment(),
            "aws": aws,
            "api": {
                "baseUrl": self
                    .aws_appsync_graphql_endpoint
                    .as_deref()
                    .unwrap_or(DEFAULT_API_BASE_URL),
                "timeout": 30000
            },
            "features": {
                "audioProcessing": true,
                "socialSharing": false,
                "analytics": self.aws_mobile_analytics_app_id.is_some()
            }
        })
    }
}

fn read_exports(path: &Path) -> anyhow::Result<LegacyExports> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("Failed to parse '{}'", path.display()))
}

/// Loads the exports file at the given path as partial configuration tree.
///
/// Yields `None` if the file is missing, unreadable or still contains placeholder values.
pub fn load(path: &Path) -> Option<Value> {
    match read_exports(path) {
        Ok(exports) if exports.is_provisioned() => {
            tracing::debug!("Using legacy exports from '{}'", path.display());
            Some(exports.to_config_tree())
        }
        Ok(_) => {
            tracing::info!(
                "'{}' contains placeholder values, skipping...",
                path.display()
            );
            None
        }
        Err(err) => {
            tracing::debug!("No usable legacy exports: {:#}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test::valid_config;

    fn provisioned_exports() -> LegacyExports {
        serde_json::from_value(json!({
            "aws_project_region": "eu-west-1",
            "aws_cognito_region": "eu-west-1",
            "aws_user_pools_id": "eu-west-1_Pool42",
            "aws_user_pools_web_client_id": "client",
            "aws_cognito_identity_pool_id": "eu-west-1:abc",
            "aws_appsync_graphqlEndpoint": "https://abc.appsync-api.eu-west-1.amazonaws.com/graphql",
            "aws_appsync_region": "eu-west-1",
            "aws_appsync_authenticationType": "API_KEY",
            "aws_appsync_apiKey": "da2-key",
            "aws_user_files_s3_bucket": "littlebit-staging-audio",
            "aws_user_files_s3_bucket_region": "eu-west-1",
            "aws_sqs_queue_url": "https://sqs.eu-west-1.amazonaws.com/1/queue"
        }))
        .unwrap()
    }

    #[test]
    fn placeholders_are_not_provisioned() {
        let mut exports = provisioned_exports();
        assert!(exports.is_provisioned());

        exports.aws_user_pools_id = Some("placeholder".to_string());
        assert!(!exports.is_provisioned());

        exports = provisioned_exports();
        exports.aws_user_files_s3_bucket = None;
        assert!(!exports.is_provisioned());
    }

    #[test]
    fn environment_is_inferred_from_names() {
        let mut exports = provisioned_exports();
        exports.aws_user_files_s3_bucket = Some("audio-bucket-staging".to_string());
        assert_eq!(exports.infer_environment(), "development");

        exports.aws_user_files_s3_bucket = Some("littlebit-staging-audio".to_string());
        assert_eq!(exports.infer_environment(), "staging");

        exports.aws_appsync_graphql_endpoint = Some("https://prod.example.com".to_string());
        assert_eq!(exports.infer_environment(), "production");
    }

    #[test]
    fn converts_to_nested_tree() {
        let tree = provisioned_exports().to_config_tree();

        assert_eq!(tree["environment"], json!("staging"));
        assert_eq!(tree["aws"]["region"], json!("eu-west-1"));
        assert_eq!(tree["aws"]["cognito"]["userPoolId"], json!("eu-west-1_Pool42"));
        assert_eq!(tree["aws"]["appsync"]["apiKey"], json!("da2-key"));
        assert_eq!(
            tree["aws"]["sqsQueueUrl"],
            json!("https://sqs.eu-west-1.amazonaws.com/1/queue")
        );
        assert_eq!(
            tree["api"]["baseUrl"],
            json!("https://abc.appsync-api.eu-west-1.amazonaws.com/graphql")
        );
        assert_eq!(tree["features"]["analytics"], json!(false));
    }

    #[test]
    fn analytics_follows_app_id() {
        let mut exports = provisioned_exports();
        exports.aws_mobile_analytics_app_id = Some("pinpoint".to_string());

        assert_eq!(exports.to_config_tree()["features"]["analytics"], json!(true));
    }

    #[test]
    fn missing_file_yields_none() {
        assert_eq!(load(Path::new("/definitely/not/here/aws-exports.json")), None);
    }

    #[test]
    fn from_config_uses_amplify_key_names() {
        let exports = valid_config().to_legacy_exports();
        let value = serde_json::to_value(&exports).unwrap();

        assert_eq!(value["aws_user_pools_id"], json!("us-west-2_ABC123"));
        assert_eq!(value["aws_appsync_authenticationType"], json!("API_KEY"));
        assert_eq!(value["aws_mobile_analytics_app_region"], json!("us-west-2"));
        assert!(value.get("aws_sqs_queue_url").is_none());
    }
}
