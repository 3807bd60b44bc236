//! Object storage in S3.
//!
//! [`S3Service`](s3::S3Service) wraps the AWS SDK. [`StorageAdapter`](adapter::StorageAdapter)
//! exposes it through the Amplify shaped [`StorageBackend`] interface.

use crate::auth::FederatedCredentials;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub mod adapter;
pub mod metadata;
pub mod s3;

/// Lifetime of presigned URLs unless requested otherwise.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 3600;

pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone, Debug, Default)]
pub struct GetUrlOptions {
    /// Lifetime of the URL in seconds.
    pub expires_in: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct GetUrlInput {
    pub key: String,
    pub options: GetUrlOptions,
}

impl GetUrlInput {
    pub fn new(key: impl Into<String>) -> Self {
        GetUrlInput {
            key: key.into(),
            options: GetUrlOptions::default(),
        }
    }
}

/// A presigned URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageUrl {
    pub href: String,
}

impl Display for StorageUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.href)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GetUrlOutput {
    pub url: StorageUrl,
}

#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    /// Stored as user defined object metadata (`x-amz-meta-*`).
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default)]
pub struct PutInput {
    pub key: String,
    pub data: Bytes,
    pub options: PutOptions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PutOutput {
    pub key: String,
}

#[derive(Clone, Debug, Default)]
pub struct RemoveInput {
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoveOutput {
    pub key: String,
}

#[derive(Clone, Debug, Default)]
pub struct GetUploadUrlOptions {
    /// Defaults to [`DEFAULT_UPLOAD_CONTENT_TYPE`].
    pub content_type: Option<String>,
    pub expires_in: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct GetUploadUrlInput {
    pub key: String,
    pub options: GetUploadUrlOptions,
}

/// The Amplify `Storage` surface.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get_url(&self, input: GetUrlInput) -> anyhow::Result<GetUrlOutput>;

    async fn put(&self, input: PutInput) -> anyhow::Result<PutOutput>;

    async fn remove(&self, input: RemoveInput) -> anyhow::Result<RemoveOutput>;

    /// Returns a presigned URL which accepts a `PUT` of the object.
    async fn get_upload_url(&self, input: GetUploadUrlInput) -> anyhow::Result<String>;

    /// Switches all subsequent requests to credentials obtained for the given identity.
    fn update_credentials(&self, credentials: FederatedCredentials);

    /// Returns to the credentials the backend was created with.
    fn reset_credentials(&self);
}
