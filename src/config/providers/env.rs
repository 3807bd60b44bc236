//! Environment variables, the highest priority source.

use crate::config::providers::EnvVars;
use serde_json::{Map, Value, json};

/// Documents which variable feeds which configuration path.
pub const ENV_VAR_MAPPING: [(&str, &str); 18] = [
    ("environment", "APP_ENV"),
    ("aws.region", "APP_AWS_REGION or AWS_DEFAULT_REGION"),
    ("aws.cognito.userPoolId", "APP_COGNITO_USER_POOL_ID"),
    ("aws.cognito.clientId", "APP_COGNITO_CLIENT_ID"),
    ("aws.cognito.identityPoolId", "APP_COGNITO_IDENTITY_POOL_ID"),
    ("aws.cognito.region", "APP_COGNITO_REGION"),
    ("aws.s3.bucketName", "APP_S3_BUCKET_NAME"),
    ("aws.s3.region", "APP_S3_REGION"),
    ("aws.appsync.endpoint", "APP_APPSYNC_ENDPOINT"),
    ("aws.appsync.region", "APP_APPSYNC_REGION"),
    ("aws.appsync.authenticationType", "APP_APPSYNC_AUTH_TYPE"),
    ("aws.appsync.apiKey", "APP_APPSYNC_API_KEY"),
    ("aws.sqsQueueUrl", "APP_SQS_QUEUE_URL"),
    ("api.baseUrl", "APP_API_BASE_URL"),
    ("api.timeout", "APP_API_TIMEOUT"),
    ("features.audioProcessing", "APP_FEATURE_AUDIO_PROCESSING"),
    ("features.socialSharing", "APP_FEATURE_SOCIAL_SHARING"),
    ("features.analytics", "APP_FEATURE_ANALYTICS"),
];

const DEFAULT_AUTH_TYPE: &str = "AMAZON_COGNITO_USER_POOLS";

/// Builds a partial configuration tree from the given variables.
///
/// A section is only emitted if at least one of its variables is set.
pub fn load_from_env(vars: &EnvVars) -> Value {
    let mut config = Map::new();
    let mut aws = Map::new();

    if let Some(environment) = vars.get("APP_ENV") {
        config.insert("environment".to_string(), json!(environment));
    }

    let region = vars.first_of(&["APP_AWS_REGION", "AWS_DEFAULT_REGION"]);
    if let Some(region) = region {
        aws.insert("region".to_string(), json!(region));
    }

    if any_set(
        vars,
        &[
            "APP_COGNITO_USER_POOL_ID",
            "APP_COGNITO_CLIENT_ID",
            "APP_COGNITO_IDENTITY_POOL_ID",
        ],
    ) {
        aws.insert(
            "cognito".to_string(),
            json!({
                "userPoolId": vars.get("APP_COGNITO_USER_POOL_ID"),
                "clientId": vars.get("APP_COGNITO_CLIENT_ID"),
                "identityPoolId": vars.get("APP_COGNITO_IDENTITY_POOL_ID"),
                "region": vars.get("APP_COGNITO_REGION").or(region)
            }),
        );
    }

    if let Some(bucket_name) = vars.get("APP_S3_BUCKET_NAME") {
        aws.insert(
            "s3".to_string(),
            json!({
                "bucketName": bucket_name,
                "region": vars.get("APP_S3_REGION").or(region)
            }),
        );
    }

    if any_set(
        vars,
        &[
            "APP_APPSYNC_ENDPOINT",
            "APP_APPSYNC_AUTH_TYPE",
            "APP_APPSYNC_API_KEY",
        ],
    ) {
        aws.insert(
            "appsync".to_string(),
            json!({
                "endpoint": vars.get("APP_APPSYNC_ENDPOINT"),
                "region": vars.get("APP_APPSYNC_REGION").or(region),
                "authenticationType": vars.get("APP_APPSYNC_AUTH_TYPE").unwrap_or(DEFAULT_AUTH_TYPE),
                "apiKey": vars.get("APP_APPSYNC_API_KEY")
            }),
        );
    }

    if let Some(queue_url) = vars.get("APP_SQS_QUEUE_URL") {
        aws.insert("sqsQueueUrl".to_string(), json!(queue_url));
    }

    if !aws.is_empty() {
        config.insert("aws".to_string(), Value::Object(aws));
    }

    if any_set(vars, &["APP_API_BASE_URL", "APP_API_TIMEOUT"]) {
        config.insert(
            "api".to_string(),
            json!({
                "baseUrl": vars.get("APP_API_BASE_URL"),
                "timeout": parse_timeout(vars, "APP_API_TIMEOUT")
            }),
        );
    }

    if any_set(
        vars,
        &[
            "APP_FEATURE_AUDIO_PROCESSING",
            "APP_FEATURE_SOCIAL_SHARING",
            "APP_FEATURE_ANALYTICS",
        ],
    ) {
        config.insert(
            "features".to_string(),
            json!({
                "audioProcessing": parse_flag(vars, "APP_FEATURE_AUDIO_PROCESSING"),
                "socialSharing": parse_flag(vars, "APP_FEATURE_SOCIAL_SHARING"),
                "analytics": parse_flag(vars, "APP_FEATURE_ANALYTICS")
            }),
        );
    }

    Value::Object(config)
}

fn any_set(vars: &EnvVars, names: &[&str]) -> bool {
    names.iter().any(|name| vars.is_set(name))
}

fn parse_flag(vars: &EnvVars, name: &str) -> Option<bool> {
    let value = vars.get(name)?;

    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        tracing::warn!("Ignoring {}: '{}' is not a boolean", name, value);
        None
    }
}

fn parse_timeout(vars: &EnvVars, name: &str) -> Option<u64> {
    let value = vars.get(name)?;

    match value.trim().parse::<u64>() {
        Ok(timeout) => Some(timeout),
        Err(_) => {
            tracing::warn!(
                "Ignoring {}: '{}' is not a number of milliseconds",
                name,
                value
            );
            None
        }
    }
}
