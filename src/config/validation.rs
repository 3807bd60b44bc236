//! Structural validation of merged configuration trees.
//!
//! Validation runs on the raw JSON tree rather than on [`Config`](super::Config) so that every
//! violated invariant can be reported at once instead of failing on the first type mismatch.

use crate::config::{AuthenticationType, Environment};
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static REGION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}-[a-z]+-\d$").expect("Invalid regex"));

static USER_POOL_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}-[a-z]+-\d_[a-zA-Z0-9]+$").expect("Invalid regex"));

static BUCKET_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").expect("Invalid regex"));

static API_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid regex"));

const FEATURE_FLAGS: [&str; 3] = ["audioProcessing", "socialSharing", "analytics"];

/// Outcome of [`validate_config`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn is_valid_aws_region(region: &str) -> bool {
    REGION_REGEX.is_match(region)
}

pub fn is_valid_user_pool_id(user_pool_id: &str) -> bool {
    USER_POOL_ID_REGEX.is_match(user_pool_id)
}

pub fn is_valid_bucket_name(bucket_name: &str) -> bool {
    (3..=63).contains(&bucket_name.len()) && BUCKET_NAME_REGEX.is_match(bucket_name)
}

pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

pub fn is_valid_api_key(api_key: &str) -> bool {
    API_KEY_REGEX.is_match(api_key)
}

/// Validates a merged configuration tree and collects every violation.
pub fn validate_config(config: &Value) -> ValidationReport {
    let mut errors = Vec::new();

    let Some(config) = config.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec!["Configuration must be an object".to_string()],
        };
    };

    if !config
        .get("environment")
        .and_then(Value::as_str)
        .is_some_and(|env| Environment::parse(env).is_some())
    {
        errors.push("Invalid environment value".to_string());
    }

    match config.get("aws").filter(|aws| aws.is_object()) {
        Some(aws) => validate_aws(aws, &mut errors),
        None => errors.push("AWS configuration is required".to_string()),
    }

    match config.get("api").filter(|api| api.is_object()) {
        Some(api) => {
            if !string_at(api, "baseUrl").is_some_and(is_valid_url) {
                errors.push("Invalid API base URL format".to_string());
            }
            if api.get("timeout").and_then(Value::as_u64).is_none() {
                errors.push("API timeout must be a non-negative number".to_string());
            }
        }
        None => errors.push("API configuration is required".to_string()),
    }

    match config.get("features").filter(|features| features.is_object()) {
        Some(features) => {
            for feature in FEATURE_FLAGS {
                if !features.get(feature).is_some_and(Value::is_boolean) {
                    errors.push(format!("Feature flag '{}' must be a boolean", feature));
                }
            }
        }
        None => errors.push("Features configuration is required".to_string()),
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn validate_aws(aws: &Value, errors: &mut Vec<String>) {
    if !string_at(aws, "region").is_some_and(is_valid_aws_region) {
        errors.push("Invalid AWS region format".to_string());
    }

    match aws.get("cognito").filter(|cognito| cognito.is_object()) {
        Some(cognito) => {
            if !string_at(cognito, "userPoolId").is_some_and(is_valid_user_pool_id) {
                errors.push("Invalid User Pool ID format".to_string());
            }
            if !string_at(cognito, "clientId").is_some_and(|id| !id.trim().is_empty()) {
                errors.push("Cognito Client ID is required".to_string());
            }
            if !string_at(cognito, "identityPoolId").is_some_and(|id| !id.trim().is_empty()) {
                errors.push("Cognito Identity Pool ID is required".to_string());
            }
            if string_at(cognito, "region").is_some_and(|region| !is_valid_aws_region(region)) {
                errors.push("Invalid Cognito region format".to_string());
            }
        }
        None => errors.push("Cognito configuration is required".to_string()),
    }

    match aws.get("s3").filter(|s3| s3.is_object()) {
        Some(s3) => {
            if !string_at(s3, "bucketName").is_some_and(is_valid_bucket_name) {
                errors.push("Invalid S3 bucket name format".to_string());
            }
            if string_at(s3, "region").is_some_and(|region| !is_valid_aws_region(region)) {
                errors.push("Invalid S3 region format".to_string());
            }
        }
        None => errors.push("S3 configuration is required".to_string()),
    }

    match aws.get("appsync").filter(|appsync| appsync.is_object()) {
        Some(appsync) => {
            if !string_at(appsync, "endpoint").is_some_and(is_valid_url) {
                errors.push("Invalid AppSync endpoint URL".to_string());
            }

            let auth_type = string_at(appsync, "authenticationType").and_then(AuthenticationType::parse);
            if auth_type.is_none() {
                errors.push("Invalid authentication type".to_string());
            }

            if auth_type == Some(AuthenticationType::ApiKey)
                && let Some(api_key) = string_at(appsync, "apiKey")
                && !is_valid_api_key(api_key)
            {
                errors.push("Invalid AppSync API key format".to_string());
            }
        }
        None => errors.push("AppSync configuration is required".to_string()),
    }

    if let Some(queue_url) = aws.get("sqsQueueUrl")
        && !queue_url.as_str().is_some_and(is_valid_url)
    {
        errors.push("Invalid SQS queue URL".to_string());
    }
}

fn string_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test::valid_config_value;
    use serde_json::json;

    #[test]
    fn accepts_the_reference_configuration() {
        let report = validate_config(&valid_config_value());

        assert_eq!(
            report,
            ValidationReport {
                valid: true,
                errors: vec![]
            }
        );
    }

    #[test]
    fn reports_every_violation_at_once() {
        let mut config = valid_config_value();
        config["aws"]["region"] = json!("uswest2");
        config["aws"]["s3"]["bucketName"] = json!("My_Bucket");

        let report = validate_config(&config);

        assert!(!report.valid);
        assert!(report.errors.contains(&"Invalid AWS region format".to_string()));
        assert!(report.errors.contains(&"Invalid S3 bucket name format".to_string()));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn reports_missing_sections() {
        let report = validate_config(&json!({"environment": "production"}));

        assert_eq!(
            report.errors,
            vec![
                "AWS configuration is required",
                "API configuration is required",
                "Features configuration is required"
            ]
        );
    }

    #[test]
    fn rejects_non_objects() {
        let report = validate_config(&json!("config"));

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Configuration must be an object"]);
    }

    #[test]
    fn rejects_unknown_environment_and_auth_type() {
        let mut config = valid_config_value();
        config["environment"] = json!("test");
        config["aws"]["appsync"]["authenticationType"] = json!("OIDC");

        let report = validate_config(&config);

        assert_eq!(
            report.errors,
            vec!["Invalid environment value", "Invalid authentication type"]
        );
    }

    #[test]
    fn rejects_non_boolean_feature_flags_and_bad_timeout() {
        let mut config = valid_config_value();
        config["features"]["analytics"] = json!("yes");
        config["api"]["timeout"] = json!(-5);

        let report = validate_config(&config);

        assert_eq!(
            report.errors,
            vec![
                "API timeout must be a non-negative number",
                "Feature flag 'analytics' must be a boolean"
            ]
        );
    }

    #[test]
    fn rejects_malformed_api_key_only_for_api_key_auth() {
        let mut config = valid_config_value();
        config["aws"]["appsync"]["apiKey"] = json!("da2 key with spaces");
        assert_eq!(
            validate_config(&config).errors,
            vec!["Invalid AppSync API key format"]
        );

        config["aws"]["appsync"]["authenticationType"] = json!("AMAZON_COGNITO_USER_POOLS");
        assert!(validate_config(&config).valid);
    }

    #[test]
    fn field_validators() {
        assert!(is_valid_aws_region("eu-central-1"));
        assert!(!is_valid_aws_region("eu-central"));
        assert!(is_valid_user_pool_id("us-west-2_aBc123"));
        assert!(!is_valid_user_pool_id("us-west-2-aBc123"));
        assert!(is_valid_bucket_name("abc"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("-abc"));
        assert!(!is_valid_bucket_name(&"a".repeat(64)));
        assert!(is_valid_url("https://api.x.com"));
        assert!(!is_valid_url("not a url"));
    }
}
