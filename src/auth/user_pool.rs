//! Access to the Cognito user pool API.

use crate::error::ResultExt;
use anyhow::{Context, bail};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType, ChallengeNameType};

/// The tokens handed out by a successful authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    /// Only present on initial authentication. Refreshes keep the previous refresh token.
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUpResponse {
    pub user_sub: String,
    pub user_confirmed: bool,
}

/// The user pool operations required by the
/// [`CognitoAuthService`](crate::auth::cognito::CognitoAuthService).
#[async_trait]
pub trait UserPoolClient: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<TokenSet>;

    /// Exchanges a refresh token for new tokens. Yields `None` if the refresh token was rejected.
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<Option<TokenSet>>;

    async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> anyhow::Result<SignUpResponse>;

    async fn confirm_sign_up(&self, username: &str, code: &str) -> anyhow::Result<()>;

    /// Revokes all tokens issued for the given access token.
    async fn global_sign_out(&self, access_token: &str) -> anyhow::Result<()>;
}

/// Talks to a user pool using the AWS SDK.
pub struct CognitoUserPoolClient {
    client: Client,
    client_id: String,
}

impl CognitoUserPoolClient {
    pub fn new(client: Client, client_id: impl Into<String>) -> Self {
        CognitoUserPoolClient {
            client,
            client_id: client_id.into(),
        }
    }

    /// Creates a client for the given region. All used operations are unauthenticated,
    /// therefore no AWS credentials are loaded.
    pub async fn for_region(region: &str, client_id: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .no_credentials()
            .load()
            .await;

        Self::new(Client::new(&sdk_config), client_id)
    }
}

#[async_trait]
impl UserPoolClient for CognitoUserPoolClient {
    #[tracing::instrument(level = "debug", skip(self, password), err(Display))]
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<TokenSet> {
        let output = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .context("Authentication failed")
            .mark_transport_error()?;

        match output.challenge_name() {
            None => {}
            Some(ChallengeNameType::NewPasswordRequired) => bail!("New password required"),
            Some(challenge) => bail!(
                "Unsupported authentication challenge: {}",
                challenge.as_str()
            ),
        }

        let result = output
            .authentication_result()
            .context("Authentication failed: No tokens received")?;

        Ok(TokenSet {
            id_token: result
                .id_token()
                .context("Authentication failed: No ID token received")?
                .to_owned(),
            access_token: result
                .access_token()
                .context("Authentication failed: No access token received")?
                .to_owned(),
            refresh_token: result.refresh_token().map(str::to_owned),
        })
    }

    #[tracing::instrument(level = "debug", skip_all, err(Display))]
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<Option<TokenSet>> {
        let output = match self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::RefreshTokenAuth)
            .client_id(&self.client_id)
            .auth_parameters("REFRESH_TOKEN", refresh_token)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|err| err.is_not_authorized_exception()) =>
            {
                tracing::debug!("Refresh token was rejected");
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .context("Failed to refresh the session")
                    .mark_transport_error();
            }
        };

        let Some(result) = output.authentication_result() else {
            return Ok(None);
        };

        match (result.id_token(), result.access_token()) {
            (Some(id_token), Some(access_token)) => Ok(Some(TokenSet {
                id_token: id_token.to_owned(),
                access_token: access_token.to_owned(),
                refresh_token: result.refresh_token().map(str::to_owned),
            })),
            _ => Ok(None),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, password), err(Display))]
    async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> anyhow::Result<SignUpResponse> {
        let email_attribute = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .context("Failed to build the email attribute")?;

        let output = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(username)
            .password(password)
            .user_attributes(email_attribute)
            .send()
            .await
            .context("Sign up failed")
            .mark_transport_error()?;

        Ok(SignUpResponse {
            user_sub: output.user_sub().to_owned(),
            user_confirmed: output.user_confirmed(),
        })
    }

    #[tracing::instrument(level = "debug", skip(self, code), err(Display))]
    async fn confirm_sign_up(&self, username: &str, code: &str) -> anyhow::Result<()> {
        self.client
            .confirm_sign_up()
            .client_id(&self.client_id)
            .username(username)
            .confirmation_code(code)
            .send()
            .await
            .context("Confirmation failed")
            .mark_transport_error()?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, err(Display))]
    async fn global_sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .context("Failed to revoke the session")
            .mark_transport_error()?;

        Ok(())
    }
}
