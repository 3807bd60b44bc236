use crate::auth::identity_pool::{FederatedCredentialsProvider, IdentityPoolClient};
use crate::auth::FederatedCredentials;
use crate::config::Config;
use crate::error::ResultExt;
use crate::validation_bail;
use anyhow::Context;
use arc_swap::ArcSwap;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub bucket: String,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

/// Accesses the objects of a single bucket.
///
/// The underlying client is swapped atomically by [`update_credentials`](S3Service::update_credentials),
/// so a service can be shared while the signed-in user changes.
pub struct S3Service {
    client: ArcSwap<Client>,
    base_config: config::Config,
    bucket: String,
}

impl Debug for S3Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "S3Service({})", self.bucket)
    }
}

fn ensure_key(key: &str) -> anyhow::Result<()> {
    if key.trim().is_empty() {
        validation_bail!("Invalid key provided");
    }

    Ok(())
}

impl S3Service {
    /// Creates a service for the configured bucket which signs requests with the guest identity
    /// of the identity pool.
    pub fn new(config: &Config, identity_pool: Arc<dyn IdentityPoolClient>) -> anyhow::Result<Self> {
        let bucket = &config.aws.s3.bucket_name;
        let identity_pool_id = &config.aws.cognito.identity_pool_id;
        if bucket.is_empty() || identity_pool_id.is_empty() || config.aws.region.is_empty() {
            validation_bail!("Missing required S3 configuration");
        }

        tracing::info!(
            "Setting up S3 access to bucket '{}' in {}...",
            bucket,
            config.s3_region()
        );

        let guest = FederatedCredentials::guest(config.cognito_region(), identity_pool_id);
        let s3_config = config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.s3_region().to_owned()))
            .credentials_provider(FederatedCredentialsProvider::new(guest, identity_pool))
            .build();

        Ok(Self::from_conf(bucket.clone(), s3_config))
    }

    /// Creates a service from a prepared SDK configuration.
    pub fn from_conf(bucket: impl Into<String>, s3_config: config::Config) -> Self {
        S3Service {
            client: ArcSwap::from_pointee(Client::from_conf(s3_config.clone())),
            base_config: s3_config,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn client(&self) -> Arc<Client> {
        self.client.load_full()
    }

    /// Replaces the credentials used for all subsequent requests.
    pub fn update_credentials(&self, provider: impl ProvideCredentials + 'static) {
        let s3_config = self
            .base_config
            .to_builder()
            .credentials_provider(provider)
            .build();

        self.client.store(Arc::new(Client::from_conf(s3_config)));
        tracing::debug!("Updated S3 credentials for bucket '{}'", self.bucket);
    }

    /// Returns to the credentials of the configuration the service was created with.
    pub fn reset_credentials(&self) {
        self.client
            .store(Arc::new(Client::from_conf(self.base_config.clone())));
        tracing::debug!("Reset S3 credentials for bucket '{}'", self.bucket);
    }

    /// Returns a URL which permits a `GET` of the object for the given number of seconds.
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn presigned_url(&self, key: &str, expires_in: u64) -> anyhow::Result<String> {
        ensure_key(key)?;
        let presigning_config = presigning_config(expires_in)?;

        let presigned = self
            .client()
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .inspect_err(|err| {
                tracing::error!("Failed to presign '{}' in '{}': {}", key, self.bucket, err)
            })
            .context("Failed to generate presigned URL")
            .mark_transport_error()?;

        Ok(presigned.uri().to_string())
    }

    /// Returns a URL which permits a `PUT` of the object with the given content type.
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: u64,
    ) -> anyhow::Result<String> {
        ensure_key(key)?;
        let presigning_config = presigning_config(expires_in)?;

        let presigned = self
            .client()
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Failed to presign an upload of '{}' in '{}': {}",
                    key,
                    self.bucket,
                    err
                )
            })
            .context("Failed to generate presigned upload URL")
            .mark_transport_error()?;

        Ok(presigned.uri().to_string())
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(size = body.len()), err(Display))]
    pub async fn upload(
        &self,
        key: &str,
        body: Bytes,
        options: UploadOptions,
    ) -> anyhow::Result<UploadResult> {
        ensure_key(key)?;

        let output = self
            .client()
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(options.content_type)
            .set_metadata(options.metadata.map(|metadata| metadata.into_iter().collect()))
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!("Failed to store '{}' in '{}': {}", key, self.bucket, err)
            })
            .context("Failed to upload file")
            .mark_transport_error()?;

        Ok(UploadResult {
            key: key.to_owned(),
            bucket: self.bucket.clone(),
            e_tag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
        })
    }

    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        ensure_key(key)?;

        self.client()
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!("Failed to delete '{}' from '{}': {}", key, self.bucket, err)
            })
            .context("Failed to delete file")
            .mark_transport_error()?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn download(&self, key: &str) -> anyhow::Result<Bytes> {
        ensure_key(key)?;

        let result = self
            .client()
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!("Failed to fetch '{}' from '{}': {}", key, self.bucket, err)
            })
            .context("Failed to download file")
            .mark_transport_error()?;

        let data = result
            .body
            .collect()
            .await
            .context("Failed to download file")
            .mark_transport_error()?
            .into_bytes();

        Ok(data)
    }
}

fn presigning_config(expires_in: u64) -> anyhow::Result<PresigningConfig> {
    PresigningConfig::expires_in(Duration::from_secs(expires_in))
        .with_context(|| format!("Invalid URL expiry of {} seconds", expires_in))
        .mark_validation_error()
}


#[cfg(test)]
mod tests {
    use super::test::{FakeS3, fake_s3_config};
    use super::*;
    use crate::auth::test::FakeIdentityPool;
    use crate::config::test::valid_config;
    use crate::error::{ErrorKind, kind_of};

    fn fake_service() -> (S3Service, FakeS3) {
        let fake = FakeS3::default();
        let addr = fake.start();

        (S3Service::from_conf("my-bucket", fake_s3_config(addr)), fake)
    }

    #[tokio::test]
    async fn presigned_urls_round_trip_byte_for_byte() {
        let (service, fake) = fake_service();
        let audio: Vec<u8> = (0..=255).cycle().take(4096).collect();

        let upload_url = service
            .presigned_upload_url("recordings/take-1.wav", "audio/wav", 600)
            .await
            .unwrap();
        let response = reqwest::Client::new()
            .put(&upload_url)
            .header("Content-Type", "audio/wav")
            .body(audio.clone())
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            fake.object("my-bucket/recordings/take-1.wav").unwrap().to_vec(),
            audio
        );

        let download_url = service
            .presigned_url("recordings/take-1.wav", 600)
            .await
            .unwrap();
        assert!(download_url.contains("X-Amz-Signature="));
        let downloaded = reqwest::get(&download_url)
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();

        assert_eq!(downloaded.to_vec(), audio);
    }

    #[tokio::test]
    async fn upload_download_and_delete() {
        let (service, fake) = fake_service();

        let result = service
            .upload(
                "notes/a.txt",
                Bytes::from_static(b"hello"),
                UploadOptions {
                    content_type: Some("text/plain".to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.key, "notes/a.txt");
        assert_eq!(result.bucket, "my-bucket");
        assert_eq!(result.e_tag.as_deref(), Some("\"fake-etag\""));

        assert_eq!(
            service.download("notes/a.txt").await.unwrap(),
            Bytes::from_static(b"hello")
        );

        service.delete("notes/a.txt").await.unwrap();
        assert!(fake.object("my-bucket/notes/a.txt").is_none());

        let err = service.download("notes/a.txt").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to download file"));
        assert_eq!(kind_of(&err), Some(ErrorKind::Transport));
    }

    #[tokio::test]
    async fn empty_keys_are_rejected_before_any_request() {
        let (service, _) = fake_service();

        for err in [
            service.presigned_url("", 60).await.unwrap_err(),
            service.presigned_upload_url(" ", "a/b", 60).await.unwrap_err(),
            service
                .upload("", Bytes::new(), UploadOptions::default())
                .await
                .unwrap_err(),
            service.delete("").await.unwrap_err(),
        ] {
            assert_eq!(err.to_string(), "Invalid key provided");
            assert_eq!(kind_of(&err), Some(ErrorKind::Validation));
        }
    }

    #[tokio::test]
    async fn update_credentials_swaps_the_signing_identity() {
        let identity_pool = Arc::new(FakeIdentityPool::default());
        let service = S3Service::new(&valid_config(), identity_pool.clone()).unwrap();

        let url = service.presigned_url("a.wav", 60).await.unwrap();
        assert!(url.contains("AKIDguest"));
        assert!(url.starts_with("https://my-bucket.s3.us-west-2.amazonaws.com/a.wav?"));

        let mut credentials = FederatedCredentials::guest("us-west-2", "us-west-2:uuid");
        credentials
            .logins
            .insert("cognito-idp.example".to_string(), "id-token".to_string());
        service.update_credentials(FederatedCredentialsProvider::new(credentials, identity_pool));

        let url = service.presigned_url("a.wav", 60).await.unwrap();
        assert!(url.contains("AKIDauthenticated"));

        service.reset_credentials();
        let url = service.presigned_url("a.wav", 60).await.unwrap();
        assert!(url.contains("AKIDguest"));
    }

    #[test]
    fn rejects_incomplete_configuration() {
        let mut config = valid_config();
        config.aws.s3.bucket_name = String::new();

        let err = S3Service::new(&config, Arc::new(FakeIdentityPool::default())).unwrap_err();

        assert_eq!(err.to_string(), "Missing required S3 configuration");
    }

    #[tokio::test]
    async fn presigned_urls_reject_excessive_expiry() {
        let (service, _) = fake_service();

        let err = service
            .presigned_url("a.wav", 8 * 24 * 3600)
            .await
            .unwrap_err();

        assert_eq!(kind_of(&err), Some(ErrorKind::Validation));
    }

    #[tokio::test]
    #[ignore]
    async fn presigns_against_real_bucket() {
        let config = crate::config::ConfigManager::new(crate::config::LoadOptions::default())
            .load()
            .await
            .unwrap();
        let identity_pool = Arc::new(
            crate::auth::identity_pool::CognitoIdentityPoolClient::for_region(
                config.cognito_region(),
            )
            .await,
        );
        let service = S3Service::new(&config, identity_pool).unwrap();

        let url = service.presigned_url("healthcheck.txt", 60).await.unwrap();

        assert!(url.contains(&config.aws.s3.bucket_name));
    }
}
