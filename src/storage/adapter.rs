//! Exposes the [`S3Service`] through the Amplify shaped [`StorageBackend`] interface.
//!
//! Errors are rewrapped with a message prefix naming the failed operation. The underlying chain,
//! including its [`ErrorKind`](crate::error::ErrorKind), is preserved.

use crate::auth::FederatedCredentials;
use crate::auth::identity_pool::{
    CognitoIdentityPoolClient, FederatedCredentialsProvider, IdentityPoolClient,
};
use crate::config::Config;
use crate::storage::s3::{S3Service, UploadOptions};
use crate::storage::{
    DEFAULT_UPLOAD_CONTENT_TYPE, DEFAULT_URL_EXPIRY_SECS, GetUploadUrlInput, GetUrlInput,
    GetUrlOutput, PutInput, PutOutput, RemoveInput, RemoveOutput, StorageBackend, StorageUrl,
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct StorageAdapter {
    s3: S3Service,
    identity_pool: Arc<dyn IdentityPoolClient>,
}

fn prefixed<T>(result: anyhow::Result<T>, prefix: &str) -> anyhow::Result<T> {
    result.map_err(|err| {
        let message = format!("{}: {}", prefix, err);
        err.context(message)
    })
}

impl StorageAdapter {
    pub fn new(s3: S3Service, identity_pool: Arc<dyn IdentityPoolClient>) -> Self {
        StorageAdapter { s3, identity_pool }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let identity_pool: Arc<dyn IdentityPoolClient> =
            Arc::new(CognitoIdentityPoolClient::for_region(config.cognito_region()).await);
        let s3 = S3Service::new(config, identity_pool.clone())?;

        Ok(Self::new(s3, identity_pool))
    }

    pub fn s3(&self) -> &S3Service {
        &self.s3
    }
}

#[async_trait]
impl StorageBackend for StorageAdapter {
    async fn get_url(&self, input: GetUrlInput) -> anyhow::Result<GetUrlOutput> {
        let expires_in = input.options.expires_in.unwrap_or(DEFAULT_URL_EXPIRY_SECS);
        let href = prefixed(
            self.s3.presigned_url(&input.key, expires_in).await,
            "Failed to get URL",
        )?;

        Ok(GetUrlOutput {
            url: StorageUrl { href },
        })
    }

    async fn put(&self, input: PutInput) -> anyhow::Result<PutOutput> {
        let options = UploadOptions {
            content_type: input.options.content_type,
            metadata: input.options.metadata,
        };
        let result = prefixed(
            self.s3.upload(&input.key, input.data, options).await,
            "Failed to upload",
        )?;

        Ok(PutOutput { key: result.key })
    }

    async fn remove(&self, input: RemoveInput) -> anyhow::Result<RemoveOutput> {
        prefixed(self.s3.delete(&input.key).await, "Failed to remove")?;

        Ok(RemoveOutput { key: input.key })
    }

    async fn get_upload_url(&self, input: GetUploadUrlInput) -> anyhow::Result<String> {
        let content_type = input
            .options
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE);
        let expires_in = input.options.expires_in.unwrap_or(DEFAULT_URL_EXPIRY_SECS);

        prefixed(
            self.s3
                .presigned_upload_url(&input.key, content_type, expires_in)
                .await,
            "Failed to get upload URL",
        )
    }

    fn update_credentials(&self, credentials: FederatedCredentials) {
        tracing::debug!(
            "Switching storage credentials to the {} identity",
            if credentials.is_guest() { "guest" } else { "authenticated" }
        );
        self.s3.update_credentials(FederatedCredentialsProvider::new(
            credentials,
            self.identity_pool.clone(),
        ));
    }

    fn reset_credentials(&self) {
        tracing::debug!("Switching storage credentials to the guest identity");
        self.s3.reset_credentials();
    }
}
