//! The Cognito auth service.
//!
//! Owns the session of the signed-in user and notifies registered listeners about changes of
//! the authentication state. Absence of a session is never an error: lookups yield
//! [`AuthState::Unauthenticated`] or `None`, and only failures of the underlying calls are
//! reported as `Err`.

use crate::auth::identity_pool::{FederatedCredentials, user_pool_login_key};
use crate::auth::session::{AuthState, MemorySessionStore, Session, SessionStore};
use crate::auth::tokens::IdTokenVerifier;
use crate::auth::user_pool::{CognitoUserPoolClient, TokenSet, UserPoolClient};
use crate::config::Config;
use crate::config::validation::{is_valid_aws_region, is_valid_user_pool_id};
use crate::error::ErrorKind;
use crate::hub::{HubPayload, ListenerId, ListenerRegistry};
use crate::{kind_bail, validation_bail};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A change of the authentication state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStateEvent {
    SignedIn { user_id: String, username: String },
    SignedOut,
    TokenRefresh,
    TokenRefreshFailure,
}

impl AuthStateEvent {
    /// Returns the Amplify event name.
    pub fn name(&self) -> &'static str {
        match self {
            AuthStateEvent::SignedIn { .. } => "signedIn",
            AuthStateEvent::SignedOut => "signedOut",
            AuthStateEvent::TokenRefresh => "tokenRefresh",
            AuthStateEvent::TokenRefreshFailure => "tokenRefresh_failure",
        }
    }

    pub fn to_hub_payload(&self) -> HubPayload {
        let payload = HubPayload::new(self.name());

        match self {
            AuthStateEvent::SignedIn { user_id, username } => {
                payload.with_data(json!({ "userId": user_id, "username": username }))
            }
            _ => payload,
        }
    }
}

pub type AuthStateListener = Arc<dyn Fn(&AuthStateEvent) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResult {
    pub username: String,
    pub user_sub: String,
    pub user_confirmed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: String,
    pub username: String,
}

pub struct CognitoAuthService {
    user_pool: Arc<dyn UserPoolClient>,
    verifier: IdTokenVerifier,
    store: Arc<dyn SessionStore>,
    /// Incremented whenever a sign-in or sign-out replaces the session. Held while the store is
    /// written, so a refresh started before the change cannot overwrite its outcome.
    generation: Mutex<u64>,
    listeners: ListenerRegistry<AuthStateEvent>,
    region: String,
    user_pool_id: String,
    identity_pool_id: String,
}

impl CognitoAuthService {
    pub fn new(
        config: &Config,
        user_pool: Arc<dyn UserPoolClient>,
        verifier: IdTokenVerifier,
        store: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let cognito = &config.aws.cognito;
        if cognito.user_pool_id.is_empty() || cognito.client_id.is_empty() {
            validation_bail!("Missing required Cognito configuration");
        }

        Ok(CognitoAuthService {
            user_pool,
            verifier,
            store,
            generation: Mutex::new(0),
            listeners: ListenerRegistry::new(),
            region: config.cognito_region().to_string(),
            user_pool_id: cognito.user_pool_id.clone(),
            identity_pool_id: cognito.identity_pool_id.clone(),
        })
    }

    /// Creates a service which talks to the configured user pool and keeps the session in memory.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let region = config.cognito_region();
        let cognito = &config.aws.cognito;
        let user_pool = CognitoUserPoolClient::for_region(region, &cognito.client_id).await;
        let verifier =
            IdTokenVerifier::for_user_pool(region, &cognito.user_pool_id, &cognito.client_id);

        Self::new(
            config,
            Arc::new(user_pool),
            verifier,
            Arc::new(MemorySessionStore::new()),
        )
    }

    /// Authenticates the user and returns its user id (the `sub` claim of the ID token).
    ///
    /// Listeners are notified only after the session has been stored.
    #[tracing::instrument(level = "debug", skip(self, password), err(Display))]
    pub async fn sign_in(&self, username: &str, password: &str) -> anyhow::Result<String> {
        let tokens = self.user_pool.authenticate(username, password).await?;
        let session = self.create_session(tokens, None, username).await?;
        let user_id = session.user_id.clone();

        {
            let mut generation = self.generation();
            *generation += 1;
            self.store.store(session);
        }
        tracing::info!("User {} signed in", user_id);
        self.listeners.notify(&AuthStateEvent::SignedIn {
            user_id: user_id.clone(),
            username: username.to_string(),
        });

        Ok(user_id)
    }

    /// Registers a new user, using the email address as user name.
    #[tracing::instrument(level = "debug", skip_all, fields(email = %request.email), err(Display))]
    pub async fn sign_up(&self, request: SignUpRequest) -> anyhow::Result<SignUpResult> {
        let response = self
            .user_pool
            .sign_up(&request.email, &request.password, &request.email)
            .await?;

        Ok(SignUpResult {
            username: request.email,
            user_sub: response.user_sub,
            user_confirmed: response.user_confirmed,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, code), err(Display))]
    pub async fn confirm_sign_up(&self, username: &str, code: &str) -> anyhow::Result<()> {
        self.user_pool.confirm_sign_up(username, code).await
    }

    /// Signs the current user out.
    ///
    /// The local session is discarded before the tokens are revoked remotely, and `signedOut`
    /// is emitted even if the revocation fails. Returns `false` if the revocation failed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sign_out(&self) -> bool {
        let cleared = {
            let mut generation = self.generation();
            *generation += 1;
            self.store.clear()
        };
        let Some(session) = cleared else {
            return true;
        };

        let revoked = match self.user_pool.global_sign_out(&session.access_token).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    "Failed to revoke the session of {} remotely: {:#}",
                    session.user_id,
                    err
                );
                false
            }
        };

        tracing::info!("User {} signed out", session.user_id);
        self.listeners.notify(&AuthStateEvent::SignedOut);

        revoked
    }

    pub async fn current_user(&self) -> anyhow::Result<Option<CurrentUser>> {
        Ok(self.session().await?.into_session().map(|session| CurrentUser {
            user_id: session.user_id,
            username: session.username,
        }))
    }

    /// Returns the current session, refreshing its tokens if the ID token has expired.
    ///
    /// A rejected refresh discards the session.
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn session(&self) -> anyhow::Result<AuthState> {
        let started_in = *self.generation();
        let Some(session) = self.store.load() else {
            return Ok(AuthState::Unauthenticated);
        };

        if !session.is_expired() {
            return Ok(AuthState::Authenticated(Session::clone(&session)));
        }

        match self.user_pool.refresh(&session.refresh_token).await? {
            Some(tokens) => {
                let refreshed = self
                    .create_session(tokens, Some(&session), &session.username)
                    .await?;
                {
                    let generation = self.generation();
                    if *generation != started_in {
                        drop(generation);
                        tracing::debug!("Discarding refreshed session of {}", session.user_id);
                        return Ok(self.current_state());
                    }
                    self.store.store(refreshed.clone());
                }
                self.listeners.notify(&AuthStateEvent::TokenRefresh);

                Ok(AuthState::Authenticated(refreshed))
            }
            None => {
                {
                    let generation = self.generation();
                    if *generation != started_in {
                        drop(generation);
                        return Ok(self.current_state());
                    }
                    self.store.clear();
                }
                tracing::info!("Session of {} expired", session.user_id);
                self.listeners.notify(&AuthStateEvent::TokenRefreshFailure);

                Ok(AuthState::Unauthenticated)
            }
        }
    }

    /// Describes how to obtain AWS credentials for the signed-in user from the identity pool.
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    pub async fn credentials(&self) -> anyhow::Result<FederatedCredentials> {
        let AuthState::Authenticated(session) = self.session().await? else {
            kind_bail!(ErrorKind::Unauthenticated, "No valid session");
        };

        if !is_valid_aws_region(&self.region) {
            validation_bail!("Invalid AWS region format");
        }
        if !is_valid_user_pool_id(&self.user_pool_id) {
            validation_bail!("Invalid User Pool ID format");
        }

        let mut logins = BTreeMap::new();
        logins.insert(
            user_pool_login_key(&self.region, &self.user_pool_id),
            session.id_token,
        );

        Ok(FederatedCredentials {
            region: self.region.clone(),
            identity_pool_id: self.identity_pool_id.clone(),
            logins,
        })
    }

    /// Returns the credentials descriptor of the unauthenticated identity.
    pub fn guest_credentials(&self) -> FederatedCredentials {
        FederatedCredentials::guest(&self.region, &self.identity_pool_id)
    }

    pub fn add_listener(&self, listener: AuthStateListener) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored session as is, without refreshing it.
    fn current_state(&self) -> AuthState {
        match self.store.load() {
            Some(session) => AuthState::Authenticated(Session::clone(&session)),
            None => AuthState::Unauthenticated,
        }
    }

    async fn create_session(
        &self,
        tokens: TokenSet,
        previous: Option<&Session>,
        username: &str,
    ) -> anyhow::Result<Session> {
        let claims = self.verifier.verify(&tokens.id_token).await?;
        let refresh_token = tokens
            .refresh_token
            .or_else(|| previous.map(|session| session.refresh_token.clone()))
            .unwrap_or_default();

        Ok(Session {
            id_token: tokens.id_token,
            access_token: tokens.access_token,
            refresh_token,
            user_id: claims.sub,
            username: username.to_string(),
            expires_at: claims.exp,
        })
    }
}
