//! Application configuration.
//!
//! The configuration is assembled by the [`ConfigManager`] from three sources of increasing
//! priority: built-in [defaults](providers::defaults), an optional legacy Amplify export file
//! ([`providers::legacy`]) and environment variables ([`providers::env`]). The sources are
//! deep-merged as JSON trees ([`merge`]), validated as a whole ([`validation`]) and finally
//! deserialized into the typed [`Config`].

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

mod manager;
pub mod merge;
pub mod providers;
pub mod validation;

pub use manager::{ConfigManager, LoadOptions};
pub use providers::EnvVars;
pub use validation::{ValidationReport, validate_config};

/// The deployment stage the application runs in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn parse(name: &str) -> Option<Environment> {
        Self::ALL.into_iter().find(|env| env.as_str() == name)
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fully merged and validated configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub environment: Environment,
    pub aws: AwsConfig,
    pub api: ApiConfig,
    pub features: FeatureFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
    pub region: String,
    pub cognito: CognitoConfig,
    pub s3: S3Config,
    pub appsync: AppSyncConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqs_queue_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitoConfig {
    pub user_pool_id: String,
    pub client_id: String,
    pub identity_pool_id: String,
    pub region: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSyncConfig {
    pub endpoint: String,
    pub region: String,
    pub authentication_type: AuthenticationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// How requests against the AppSync endpoint are authorized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationType {
    ApiKey,
    AwsIam,
    AmazonCognitoUserPools,
}

impl AuthenticationType {
    pub const ALL: [AuthenticationType; 3] = [
        AuthenticationType::ApiKey,
        AuthenticationType::AwsIam,
        AuthenticationType::AmazonCognitoUserPools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationType::ApiKey => "API_KEY",
            AuthenticationType::AwsIam => "AWS_IAM",
            AuthenticationType::AmazonCognitoUserPools => "AMAZON_COGNITO_USER_POOLS",
        }
    }

    pub fn parse(name: &str) -> Option<AuthenticationType> {
        Self::ALL.into_iter().find(|auth_type| auth_type.as_str() == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    /// Request timeout in milliseconds.
    pub timeout: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub audio_processing: bool,
    pub social_sharing: bool,
    pub analytics: bool,
}

impl Config {
    /// Region used to talk to Cognito, falling back to the global AWS region.
    pub fn cognito_region(&self) -> &str {
        non_empty_or(&self.aws.cognito.region, &self.aws.region)
    }

    /// Region of the storage bucket, falling back to the global AWS region.
    pub fn s3_region(&self) -> &str {
        non_empty_or(&self.aws.s3.region, &self.aws.region)
    }

    /// Converts the configuration into the legacy Amplify export format.
    pub fn to_legacy_exports(&self) -> providers::legacy::LegacyExports {
        providers::legacy::LegacyExports::from_config(self)
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use serde_json::{Value, json};

    /// A complete and valid configuration tree as used throughout the tests.
    pub(crate) fn valid_config_value() -> Value {
        json!({
            "environment": "development",
            "aws": {
                "region": "us-west-2",
                "cognito": {
                    "userPoolId": "us-west-2_ABC123",
                    "clientId": "id",
                    "identityPoolId": "us-west-2:uuid",
                    "region": "us-west-2"
                },
                "s3": { "bucketName": "my-bucket", "region": "us-west-2" },
                "appsync": {
                    "endpoint": "https://x.appsync-api.us-west-2.amazonaws.com/graphql",
                    "region": "us-west-2",
                    "authenticationType": "API_KEY",
                    "apiKey": "key"
                }
            },
            "api": { "baseUrl": "https://api.x.com", "timeout": 30000 },
            "features": { "audioProcessing": true, "socialSharing": false, "analytics": false }
        })
    }

    pub(crate) fn valid_config() -> Config {
        serde_json::from_value(valid_config_value()).unwrap()
    }

    #[test]
    fn config_round_trips_through_camel_case_json() {
        let config = valid_config();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.aws.cognito.user_pool_id, "us-west-2_ABC123");
        assert_eq!(
            config.aws.appsync.authentication_type,
            AuthenticationType::ApiKey
        );
        assert_eq!(config.aws.sqs_queue_url, None);
        assert_eq!(serde_json::to_value(&config).unwrap(), valid_config_value());
    }

    #[test]
    fn regions_fall_back_to_global_region() {
        let mut config = valid_config();
        config.aws.region = "eu-central-1".to_string();
        config.aws.cognito.region = String::new();
        config.aws.s3.region = String::new();

        assert_eq!(config.cognito_region(), "eu-central-1");
        assert_eq!(config.s3_region(), "eu-central-1");
    }

    #[test]
    fn enums_parse_their_wire_names() {
        assert_eq!(Environment::parse("staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("test"), None);
        assert_eq!(
            AuthenticationType::parse("AWS_IAM"),
            Some(AuthenticationType::AwsIam)
        );
        assert_eq!(AuthenticationType::parse("OIDC"), None);
    }
}
