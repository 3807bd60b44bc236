//! Built-in configuration values, the lowest priority source.

use crate::config::merge::deep_merge;
use serde_json::{Value, json};

/// Returns the defaults for the given environment name.
///
/// Unknown environments only receive the base values. The name itself is passed through
/// unchanged so that validation can report it.
pub fn defaults(environment: &str) -> Value {
    let base = json!({
        "environment": environment,
        "aws": {
            "region": "us-west-2",
            "cognito": { "region": "us-west-2" },
            "s3": { "region": "us-west-2" },
            "appsync": {
                "region": "us-west-2",
                "authenticationType": "AMAZON_COGNITO_USER_POOLS"
            }
        },
        "api": {
            "baseUrl": "https://api.littlebit.app",
            "timeout": 30000
        },
        "features": {
            "audioProcessing": true,
            "socialSharing": false,
            "analytics": false
        }
    });

    deep_merge([&base, &environment_overrides(environment)])
}

fn environment_overrides(environment: &str) -> Value {
    match environment {
        "development" => json!({
            "api": { "baseUrl": "http://localhost:3000", "timeout": 60000 },
            "features": { "audioProcessing": true, "socialSharing": true, "analytics": false }
        }),
        "staging" => json!({
            "api": { "baseUrl": "https://staging-api.littlebit.app", "timeout": 30000 },
            "features": { "audioProcessing": true, "socialSharing": true, "analytics": true }
        }),
        "production" => json!({
            "api": { "baseUrl": "https://api.littlebit.app", "timeout": 30000 },
            "features": { "audioProcessing": true, "socialSharing": true, "analytics": true }
        }),
        _ => json!({}),
    }
}
