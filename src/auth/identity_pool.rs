//! Federated identities: exchanging user pool logins for temporary AWS credentials.

use crate::error::ResultExt;
use anyhow::Context;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, future};
use aws_sdk_cognitoidentity::Client;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::SystemTime;

const PROVIDER_NAME: &str = "CognitoIdentity";

/// Describes how to obtain credentials from an identity pool.
///
/// Without logins, the unauthenticated (guest) identity of the pool is used.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedCredentials {
    pub region: String,
    pub identity_pool_id: String,
    /// Maps login providers (`cognito-idp.<region>.amazonaws.com/<userPoolId>`) to ID tokens.
    pub logins: BTreeMap<String, String>,
}

impl FederatedCredentials {
    pub fn guest(region: impl Into<String>, identity_pool_id: impl Into<String>) -> Self {
        FederatedCredentials {
            region: region.into(),
            identity_pool_id: identity_pool_id.into(),
            logins: BTreeMap::new(),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.logins.is_empty()
    }
}

impl Debug for FederatedCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCredentials")
            .field("region", &self.region)
            .field("identity_pool_id", &self.identity_pool_id)
            .field("logins", &self.logins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Returns the login provider name of a user pool.
pub fn user_pool_login_key(region: &str, user_pool_id: &str) -> String {
    format!("cognito-idp.{}.amazonaws.com/{}", region, user_pool_id)
}

#[async_trait]
pub trait IdentityPoolClient: Send + Sync {
    /// Resolves the identity id for the given logins.
    async fn get_id(
        &self,
        identity_pool_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;

    async fn get_credentials(
        &self,
        identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<Credentials>;
}

/// Talks to the Cognito identity API using the AWS SDK.
pub struct CognitoIdentityPoolClient {
    client: Client,
}

impl CognitoIdentityPoolClient {
    pub fn new(client: Client) -> Self {
        CognitoIdentityPoolClient { client }
    }

    pub async fn for_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .no_credentials()
            .load()
            .await;

        Self::new(Client::new(&sdk_config))
    }
}

fn to_sdk_logins(logins: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    if logins.is_empty() {
        None
    } else {
        Some(logins.clone().into_iter().collect())
    }
}

#[async_trait]
impl IdentityPoolClient for CognitoIdentityPoolClient {
    #[tracing::instrument(level = "debug", skip(self, logins), err(Display))]
    async fn get_id(
        &self,
        identity_pool_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        let output = self
            .client
            .get_id()
            .identity_pool_id(identity_pool_id)
            .set_logins(to_sdk_logins(logins))
            .send()
            .await
            .with_context(|| format!("Failed to resolve an identity in '{}'", identity_pool_id))
            .mark_transport_error()?;

        output
            .identity_id()
            .map(str::to_owned)
            .context("No identity id received")
    }

    #[tracing::instrument(level = "debug", skip(self, logins), err(Display))]
    async fn get_credentials(
        &self,
        identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<Credentials> {
        let output = self
            .client
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .set_logins(to_sdk_logins(logins))
            .send()
            .await
            .with_context(|| format!("Failed to fetch credentials for '{}'", identity_id))
            .mark_transport_error()?;

        let credentials = output
            .credentials()
            .context("No credentials received")?;

        Ok(Credentials::new(
            credentials
                .access_key_id()
                .context("No access key id received")?,
            credentials
                .secret_key()
                .context("No secret key received")?,
            credentials.session_token().map(str::to_owned),
            credentials
                .expiration()
                .and_then(|expiration| SystemTime::try_from(*expiration).ok()),
            PROVIDER_NAME,
        ))
    }
}

/// Resolves AWS credentials by exchanging [`FederatedCredentials`] at the identity pool.
///
/// Can be handed to any AWS SDK client as credentials provider.
pub struct FederatedCredentialsProvider {
    descriptor: FederatedCredentials,
    client: Arc<dyn IdentityPoolClient>,
}

impl FederatedCredentialsProvider {
    pub fn new(descriptor: FederatedCredentials, client: Arc<dyn IdentityPoolClient>) -> Self {
        FederatedCredentialsProvider { descriptor, client }
    }

    pub fn descriptor(&self) -> &FederatedCredentials {
        &self.descriptor
    }

    pub async fn resolve(&self) -> anyhow::Result<Credentials> {
        let identity_id = self
            .client
            .get_id(&self.descriptor.identity_pool_id, &self.descriptor.logins)
            .await?;

        self.client
            .get_credentials(&identity_id, &self.descriptor.logins)
            .await
    }
}

impl Debug for FederatedCredentialsProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCredentialsProvider")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl ProvideCredentials for FederatedCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async move {
            self.resolve().await.map_err(|err| {
                tracing::warn!("Failed to obtain federated credentials: {:#}", err);
                CredentialsError::provider_error(err)
            })
        })
    }
}
