//! Exposes the [`CognitoAuthService`] through the Amplify shaped [`AuthBackend`] interface.

use crate::auth::cognito::{AuthStateEvent, CognitoAuthService, SignUpRequest};
use crate::auth::session::AuthState;
use crate::auth::{
    AuthBackend, AuthSession, AuthTokens, AuthUser, ConfirmSignUpInput, FederatedCredentials,
    SignInInput, SignInNextStep, SignInOutput, SignInStep, SignUpInput, SignUpNextStep,
    SignUpOutput, SignUpStep,
};
use crate::error::{ErrorKind, kind_of};
use crate::hub::{AUTH_CHANNEL, EventBus, Hub, HubEvent, HubListener, HubPayload, HubSubscription};
use crate::kind_bail;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AuthAdapter {
    cognito: Arc<CognitoAuthService>,
    hub: Hub,
}

impl AuthAdapter {
    pub fn new(cognito: Arc<CognitoAuthService>) -> Self {
        AuthAdapter {
            cognito,
            hub: Hub::new(),
        }
    }

    pub fn cognito(&self) -> &Arc<CognitoAuthService> {
        &self.cognito
    }
}

impl EventBus for AuthAdapter {
    fn dispatch(&self, channel: &str, payload: HubPayload) {
        self.hub.dispatch(channel, payload);
    }

    /// Registers the listener with the hub. Listeners of the auth channel additionally receive
    /// the state changes of the Cognito service.
    fn listen(&self, channel: &str, listener: HubListener) -> HubSubscription {
        let subscription = self.hub.listen(channel, listener.clone());
        if channel != AUTH_CHANNEL {
            return subscription;
        }

        let id = self
            .cognito
            .add_listener(Arc::new(move |event: &AuthStateEvent| {
                listener(&HubEvent {
                    channel: AUTH_CHANNEL.to_string(),
                    payload: event.to_hub_payload(),
                })
            }));
        let cognito = self.cognito.clone();

        subscription.and(HubSubscription::new(move || {
            cognito.remove_listener(id);
        }))
    }
}

#[async_trait]
impl AuthBackend for AuthAdapter {
    // The Cognito service notifies signedIn itself, dispatching it here would deliver it twice.
    async fn sign_in(&self, input: SignInInput) -> anyhow::Result<SignInOutput> {
        self.cognito.sign_in(&input.username, &input.password).await?;

        Ok(SignInOutput {
            is_signed_in: true,
            next_step: SignInNextStep {
                sign_in_step: SignInStep::Done,
            },
        })
    }

    async fn sign_up(&self, input: SignUpInput) -> anyhow::Result<SignUpOutput> {
        let result = self
            .cognito
            .sign_up(SignUpRequest {
                email: input.username,
                password: input.password,
            })
            .await?;

        let sign_up_step = if result.user_confirmed {
            SignUpStep::Done
        } else {
            SignUpStep::ConfirmSignUp
        };

        Ok(SignUpOutput {
            user_id: Some(result.user_sub),
            is_sign_up_complete: result.user_confirmed,
            next_step: SignUpNextStep { sign_up_step },
        })
    }

    async fn confirm_sign_up(&self, input: ConfirmSignUpInput) -> anyhow::Result<SignUpOutput> {
        self.cognito
            .confirm_sign_up(&input.username, &input.confirmation_code)
            .await?;

        Ok(SignUpOutput {
            user_id: None,
            is_sign_up_complete: true,
            next_step: SignUpNextStep {
                sign_up_step: SignUpStep::Done,
            },
        })
    }

    async fn sign_out(&self) -> anyhow::Result<()> {
        self.cognito.sign_out().await;
        Ok(())
    }

    async fn get_current_user(&self) -> anyhow::Result<AuthUser> {
        let Some(user) = self.cognito.current_user().await? else {
            kind_bail!(ErrorKind::Unauthenticated, "No current user");
        };

        Ok(AuthUser {
            user_id: user.user_id,
            username: user.username,
        })
    }

    async fn fetch_auth_session(&self) -> anyhow::Result<AuthSession> {
        Ok(match self.cognito.session().await? {
            AuthState::Authenticated(session) => AuthSession {
                is_signed_in: true,
                tokens: Some(AuthTokens {
                    id_token: session.id_token,
                    access_token: session.access_token,
                }),
            },
            AuthState::Unauthenticated => AuthSession {
                is_signed_in: false,
                tokens: None,
            },
        })
    }

    async fn credentials(&self) -> anyhow::Result<Option<FederatedCredentials>> {
        match self.cognito.credentials().await {
            Ok(credentials) => Ok(Some(credentials)),
            Err(err) if kind_of(&err) == Some(ErrorKind::Unauthenticated) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
