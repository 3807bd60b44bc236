//! Authentication against Cognito user pools and identity pools.
//!
//! [`CognitoAuthService`](cognito::CognitoAuthService) talks to the user pool and owns the
//! session. [`AuthAdapter`](adapter::AuthAdapter) exposes it through the Amplify shaped
//! [`AuthBackend`] interface and bridges its state changes onto the [`Hub`](crate::hub::Hub).

use crate::hub::EventBus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod cognito;
pub mod identity_pool;
mod jwks;
pub mod session;
pub mod tokens;
pub mod user_pool;

#[cfg(test)]
pub(crate) mod test;

pub use identity_pool::FederatedCredentials;

#[derive(Clone, Debug, Deserialize)]
pub struct SignInInput {
    pub username: String,
    pub password: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignInStep {
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInNextStep {
    pub sign_in_step: SignInStep,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInOutput {
    pub is_signed_in: bool,
    pub next_step: SignInNextStep,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignUpInput {
    /// The email address which doubles as user name.
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSignUpInput {
    pub username: String,
    pub confirmation_code: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignUpStep {
    Done,
    ConfirmSignUp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpNextStep {
    pub sign_up_step: SignUpStep,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub is_sign_up_complete: bool,
    pub next_step: SignUpNextStep,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub id_token: String,
    pub access_token: String,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub is_signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<AuthTokens>,
}

/// The Amplify `Auth` surface including its `Hub`.
#[async_trait]
pub trait AuthBackend: EventBus {
    async fn sign_in(&self, input: SignInInput) -> anyhow::Result<SignInOutput>;

    async fn sign_up(&self, input: SignUpInput) -> anyhow::Result<SignUpOutput>;

    async fn confirm_sign_up(&self, input: ConfirmSignUpInput) -> anyhow::Result<SignUpOutput>;

    async fn sign_out(&self) -> anyhow::Result<()>;

    /// Fails with [`ErrorKind::Unauthenticated`](crate::error::ErrorKind::Unauthenticated)
    /// if nobody is signed in.
    async fn get_current_user(&self) -> anyhow::Result<AuthUser>;

    async fn fetch_auth_session(&self) -> anyhow::Result<AuthSession>;

    /// Returns the identity pool login of the signed-in user, if any.
    async fn credentials(&self) -> anyhow::Result<Option<FederatedCredentials>>;
}
