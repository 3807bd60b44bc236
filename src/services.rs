//! Wires the adapters together and exposes the uniform, Amplify shaped functions.
//!
//! Each subsystem (auth, storage, api) is backed by one [`AuthBackend`], [`StorageBackend`] or
//! [`ApiBackend`]. Which implementation is used is decided by a [`BackendSelection`], usually
//! taken from the `REACT_APP_USE_NEW_*` variables. A subsystem without a backend rejects all
//! calls with [`ErrorKind::NotInitialized`].

use crate::api::adapter::ApiAdapter;
use crate::api::{ApiBackend, GraphQLClient, GraphQLData, GraphQLRequest};
use crate::auth::adapter::AuthAdapter;
use crate::auth::cognito::CognitoAuthService;
use crate::auth::{
    AuthBackend, AuthSession, AuthUser, ConfirmSignUpInput, SignInInput, SignInOutput,
    SignUpInput, SignUpOutput,
};
use crate::config::{Config, EnvVars};
use crate::error::ErrorKind;
use crate::hub::{EventBus, Hub, HubListener, HubPayload, HubSubscription};
use crate::kind_bail;
use crate::storage::adapter::StorageAdapter;
use crate::storage::{
    GetUploadUrlInput, GetUrlInput, GetUrlOutput, PutInput, PutOutput, RemoveInput,
    RemoveOutput, StorageBackend,
};
use anyhow::Context;
use std::sync::Arc;

/// Determines which subsystems use the adapters of this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackendSelection {
    pub use_new_auth: bool,
    pub use_new_storage: bool,
    pub use_new_api: bool,
}

impl Default for BackendSelection {
    /// The selection when none of the variables is set.
    fn default() -> Self {
        BackendSelection {
            use_new_auth: false,
            use_new_storage: true,
            use_new_api: true,
        }
    }
}

impl BackendSelection {
    /// New auth is opt-in (`REACT_APP_USE_NEW_AUTH=true`), storage and api are opt-out
    /// (`REACT_APP_USE_NEW_STORAGE=false`, `REACT_APP_USE_NEW_API=false`).
    pub fn from_env(vars: &EnvVars) -> Self {
        BackendSelection {
            use_new_auth: vars.get("REACT_APP_USE_NEW_AUTH") == Some("true"),
            use_new_storage: vars.get("REACT_APP_USE_NEW_STORAGE") != Some("false"),
            use_new_api: vars.get("REACT_APP_USE_NEW_API") != Some("false"),
        }
    }

    pub fn all() -> Self {
        BackendSelection {
            use_new_auth: true,
            use_new_storage: true,
            use_new_api: true,
        }
    }
}

pub struct InitOptions {
    pub selection: BackendSelection,
    /// Pushes the credentials of the current identity into storage once all services are up.
    pub sync_storage_credentials: bool,
    /// Backends used for the subsystems the selection does not enable. A subsystem without one
    /// is served by the adapter of this crate instead.
    pub legacy_auth: Option<Arc<dyn AuthBackend>>,
    pub legacy_storage: Option<Arc<dyn StorageBackend>>,
    pub legacy_api: Option<Arc<dyn ApiBackend>>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self::new(BackendSelection::from_env(&EnvVars::from_process()))
    }
}

impl InitOptions {
    pub fn new(selection: BackendSelection) -> Self {
        InitOptions {
            selection,
            sync_storage_credentials: true,
            legacy_auth: None,
            legacy_storage: None,
            legacy_api: None,
        }
    }

    pub fn with_legacy_auth(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.legacy_auth = Some(backend);
        self
    }

    pub fn with_legacy_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.legacy_storage = Some(backend);
        self
    }

    pub fn with_legacy_api(mut self, backend: Arc<dyn ApiBackend>) -> Self {
        self.legacy_api = Some(backend);
        self
    }
}

/// Assembles [`Services`] from explicitly provided backends.
///
/// For each subsystem the backend registered via `with_*` is used if the selection enables it,
/// otherwise the one registered via `with_legacy_*`. If only one of the two is registered, that
/// one is used regardless of the selection.
pub struct ServicesBuilder {
    selection: BackendSelection,
    auth: Option<Arc<dyn AuthBackend>>,
    storage: Option<Arc<dyn StorageBackend>>,
    api: Option<Arc<dyn ApiBackend>>,
    legacy_auth: Option<Arc<dyn AuthBackend>>,
    legacy_storage: Option<Arc<dyn StorageBackend>>,
    legacy_api: Option<Arc<dyn ApiBackend>>,
}

fn select<T: ?Sized>(enabled: bool, new: Option<Arc<T>>, legacy: Option<Arc<T>>) -> Option<Arc<T>> {
    if enabled { new.or(legacy) } else { legacy.or(new) }
}

impl ServicesBuilder {
    pub fn new(selection: BackendSelection) -> Self {
        ServicesBuilder {
            selection,
            auth: None,
            storage: None,
            api: None,
            legacy_auth: None,
            legacy_storage: None,
            legacy_api: None,
        }
    }

    pub fn with_auth(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth = Some(backend);
        self
    }

    pub fn with_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(backend);
        self
    }

    pub fn with_api(mut self, backend: Arc<dyn ApiBackend>) -> Self {
        self.api = Some(backend);
        self
    }

    pub fn with_legacy_auth(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.legacy_auth = Some(backend);
        self
    }

    pub fn with_legacy_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.legacy_storage = Some(backend);
        self
    }

    pub fn with_legacy_api(mut self, backend: Arc<dyn ApiBackend>) -> Self {
        self.legacy_api = Some(backend);
        self
    }

    pub fn build(self) -> Services {
        Services {
            auth: select(self.selection.use_new_auth, self.auth, self.legacy_auth),
            storage: select(
                self.selection.use_new_storage,
                self.storage,
                self.legacy_storage,
            ),
            api: select(self.selection.use_new_api, self.api, self.legacy_api),
            fallback_hub: Hub::new(),
        }
    }
}

/// Returns whether the adapter of this crate has to be built for a subsystem: either the
/// selection enables it or there is no legacy backend to fall back to.
fn needs_adapter<T: ?Sized>(enabled: bool, legacy: &Option<Arc<T>>, subsystem: &str) -> bool {
    if enabled {
        return true;
    }
    if legacy.is_none() {
        tracing::warn!(
            "No legacy {} backend provided, using the {} adapter",
            subsystem,
            subsystem
        );
        return true;
    }

    false
}

/// Initializes storage, auth and api (in this order).
///
/// Each subsystem is served by the adapter of this crate if the selection enables it or no
/// legacy backend was provided, so every subsystem of the returned [`Services`] is usable.
pub async fn initialize_services(config: &Config, options: InitOptions) -> anyhow::Result<Services> {
    let selection = options.selection;
    tracing::info!("Initializing services ({:?})...", selection);

    let mut builder = ServicesBuilder::new(selection);
    if needs_adapter(selection.use_new_storage, &options.legacy_storage, "storage") {
        let storage = StorageAdapter::from_config(config)
            .await
            .context("Failed to initialize storage")?;
        builder = builder.with_storage(Arc::new(storage));
    }
    if needs_adapter(selection.use_new_auth, &options.legacy_auth, "auth") {
        let cognito = CognitoAuthService::from_config(config)
            .await
            .context("Failed to initialize auth")?;
        builder = builder.with_auth(Arc::new(AuthAdapter::new(Arc::new(cognito))));
    }
    if needs_adapter(selection.use_new_api, &options.legacy_api, "api") {
        let api = ApiAdapter::from_config(config).context("Failed to initialize api")?;
        builder = builder.with_api(Arc::new(api));
    }
    if let Some(auth) = options.legacy_auth {
        builder = builder.with_legacy_auth(auth);
    }
    if let Some(storage) = options.legacy_storage {
        builder = builder.with_legacy_storage(storage);
    }
    if let Some(api) = options.legacy_api {
        builder = builder.with_legacy_api(api);
    }

    let services = builder.build();
    if options.sync_storage_credentials {
        services.sync_storage_credentials().await;
    }

    Ok(services)
}

/// The uniform entry point to all subsystems.
pub struct Services {
    auth: Option<Arc<dyn AuthBackend>>,
    storage: Option<Arc<dyn StorageBackend>>,
    api: Option<Arc<dyn ApiBackend>>,
    fallback_hub: Hub,
}

impl Services {
    fn auth(&self) -> anyhow::Result<&Arc<dyn AuthBackend>> {
        match &self.auth {
            Some(auth) => Ok(auth),
            None => kind_bail!(ErrorKind::NotInitialized, "Auth backend is not initialized"),
        }
    }

    fn storage(&self) -> anyhow::Result<&Arc<dyn StorageBackend>> {
        match &self.storage {
            Some(storage) => Ok(storage),
            None => kind_bail!(
                ErrorKind::NotInitialized,
                "Storage backend is not initialized"
            ),
        }
    }

    fn api(&self) -> anyhow::Result<&Arc<dyn ApiBackend>> {
        match &self.api {
            Some(api) => Ok(api),
            None => kind_bail!(ErrorKind::NotInitialized, "API backend is not initialized"),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }

    pub async fn sign_in(&self, input: SignInInput) -> anyhow::Result<SignInOutput> {
        let output = self.auth()?.sign_in(input).await?;
        self.sync_storage_credentials().await;

        Ok(output)
    }

    pub async fn sign_up(&self, input: SignUpInput) -> anyhow::Result<SignUpOutput> {
        self.auth()?.sign_up(input).await
    }

    pub async fn confirm_sign_up(&self, input: ConfirmSignUpInput) -> anyhow::Result<SignUpOutput> {
        self.auth()?.confirm_sign_up(input).await
    }

    pub async fn sign_out(&self) -> anyhow::Result<()> {
        self.auth()?.sign_out().await?;
        self.sync_storage_credentials().await;

        Ok(())
    }

    pub async fn get_current_user(&self) -> anyhow::Result<AuthUser> {
        self.auth()?.get_current_user().await
    }

    pub async fn fetch_auth_session(&self) -> anyhow::Result<AuthSession> {
        self.auth()?.fetch_auth_session().await
    }

    pub async fn get_url(&self, input: GetUrlInput) -> anyhow::Result<GetUrlOutput> {
        self.storage()?.get_url(input).await
    }

    pub async fn put(&self, input: PutInput) -> anyhow::Result<PutOutput> {
        self.storage()?.put(input).await
    }

    pub async fn remove(&self, input: RemoveInput) -> anyhow::Result<RemoveOutput> {
        self.storage()?.remove(input).await
    }

    pub async fn get_upload_url(&self, input: GetUploadUrlInput) -> anyhow::Result<String> {
        self.storage()?.get_upload_url(input).await
    }

    /// Executes a GraphQL operation. Failures reported by the backend are
    /// [`GraphQLFailure`](crate::api::GraphQLFailure)s which can be recovered via `downcast_ref`.
    pub async fn graphql(&self, request: GraphQLRequest) -> anyhow::Result<GraphQLData> {
        Ok(self.api()?.graphql(request).await?)
    }

    pub fn generate_client(&self) -> anyhow::Result<GraphQLClient> {
        Ok(GraphQLClient::new(self.api()?.clone()))
    }

    pub fn update_api_auth_token(&self, token: &str) -> anyhow::Result<()> {
        self.api()?.update_auth_token(token);
        Ok(())
    }

    /// Points storage at the credentials of the signed-in user, or back at the guest identity.
    ///
    /// Requires both an auth and a storage backend. Failures are logged and otherwise ignored.
    pub async fn sync_storage_credentials(&self) {
        let (Some(auth), Some(storage)) = (&self.auth, &self.storage) else {
            return;
        };

        match auth.credentials().await {
            Ok(Some(credentials)) => storage.update_credentials(credentials),
            Ok(None) => storage.reset_credentials(),
            Err(err) => tracing::warn!("Failed to sync storage credentials: {:#}", err),
        }
    }
}

/// Delegates to the auth backend, or to a local hub if there is none.
impl EventBus for Services {
    fn dispatch(&self, channel: &str, payload: HubPayload) {
        match &self.auth {
            Some(auth) => auth.dispatch(channel, payload),
            None => self.fallback_hub.dispatch(channel, payload),
        }
    }

    fn listen(&self, channel: &str, listener: HubListener) -> HubSubscription {
        match &self.auth {
            Some(auth) => auth.listen(channel, listener),
            None => self.fallback_hub.listen(channel, listener),
        }
    }
}
