//! In-memory stand-ins for the Cognito APIs.

use crate::auth::cognito::CognitoAuthService;
use crate::auth::identity_pool::IdentityPoolClient;
use crate::auth::jwks::test::MockJwksFetcher;
use crate::auth::session::MemorySessionStore;
use crate::auth::tokens::IdTokenVerifier;
use crate::auth::user_pool::{SignUpResponse, TokenSet, UserPoolClient};
use crate::config::test::valid_config;
use anyhow::bail;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) const TEST_REGION: &str = "us-west-2";
pub(crate) const TEST_USER_POOL_ID: &str = "us-west-2_ABC123";
pub(crate) const TEST_CLIENT_ID: &str = "id";
pub(crate) const CONFIRMATION_CODE: &str = "123456";

const TEST_KID: &str = "test-key";
const TEST_SECRET: &[u8] = b"user-pool-secret";

/// Signs arbitrary claims with the test key.
pub(crate) fn mint_token(claims: Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());

    encode(&header, &claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

/// Mints an ID token as the test user pool would.
pub(crate) fn mint_id_token(sub: &str, username: &str, expires_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();

    mint_token(json!({
        "sub": sub,
        "cognito:username": username,
        "email": username,
        "iss": format!("https://cognito-idp.{}.amazonaws.com/{}", TEST_REGION, TEST_USER_POOL_ID),
        "aud": TEST_CLIENT_ID,
        "token_use": "id",
        "iat": now,
        "exp": now + expires_in
    }))
}

pub(crate) fn test_verifier() -> IdTokenVerifier {
    IdTokenVerifier::with_fetcher(
        Box::new(MockJwksFetcher::with_secret(TEST_KID, TEST_SECRET)),
        TEST_REGION,
        TEST_USER_POOL_ID,
        TEST_CLIENT_ID,
        &[Algorithm::HS256],
    )
}

pub(crate) fn test_auth_service(user_pool: Arc<FakeUserPool>) -> CognitoAuthService {
    CognitoAuthService::new(
        &valid_config(),
        user_pool,
        test_verifier(),
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap()
}

struct FakeUser {
    password: String,
    sub: String,
    confirmed: bool,
}

/// A user pool which keeps its users in memory and issues tokens signed with the test key.
pub(crate) struct FakeUserPool {
    users: Mutex<HashMap<String, FakeUser>>,
    token_lifetime: AtomicI64,
    reject_refresh: AtomicBool,
    fail_sign_out: AtomicBool,
    pause_refresh: AtomicBool,
    refresh_resumed: Notify,
    pub(crate) refreshes: AtomicUsize,
    pub(crate) sign_outs: AtomicUsize,
}

impl Default for FakeUserPool {
    fn default() -> Self {
        FakeUserPool {
            users: Mutex::new(HashMap::new()),
            token_lifetime: AtomicI64::new(3600),
            reject_refresh: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            pause_refresh: AtomicBool::new(false),
            refresh_resumed: Notify::new(),
            refreshes: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        }
    }
}

impl FakeUserPool {
    pub(crate) fn with_user(username: &str, password: &str, sub: &str) -> Self {
        let pool = Self::default();
        pool.users.lock().unwrap().insert(
            username.to_string(),
            FakeUser {
                password: password.to_string(),
                sub: sub.to_string(),
                confirmed: true,
            },
        );

        pool
    }

    /// Lifetime of ID tokens issued by [`authenticate`](UserPoolClient::authenticate).
    pub(crate) fn issue_tokens_valid_for(&self, seconds: i64) {
        self.token_lifetime.store(seconds, Ordering::SeqCst);
    }

    pub(crate) fn reject_refresh(&self) {
        self.reject_refresh.store(true, Ordering::SeqCst);
    }

    /// Makes refreshes wait for [`resume_refresh`](Self::resume_refresh).
    pub(crate) fn pause_refresh(&self) {
        self.pause_refresh.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume_refresh(&self) {
        self.refresh_resumed.notify_one();
    }

    pub(crate) fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    fn tokens_for(&self, username: &str, sub: &str, lifetime: i64, refresh: bool) -> TokenSet {
        TokenSet {
            id_token: mint_id_token(sub, username, lifetime),
            access_token: format!("access-{}", sub),
            refresh_token: refresh.then(|| format!("refresh-{}", sub)),
        }
    }
}

#[async_trait]
impl UserPoolClient for FakeUserPool {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<TokenSet> {
        let sub = match self.users.lock().unwrap().get(username) {
            Some(user) if user.password == password && user.confirmed => user.sub.clone(),
            Some(user) if user.password == password => bail!("User is not confirmed"),
            _ => bail!("Authentication failed"),
        };

        let lifetime = self.token_lifetime.load(Ordering::SeqCst);
        Ok(self.tokens_for(username, &sub, lifetime, true))
    }

    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<Option<TokenSet>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.pause_refresh.load(Ordering::SeqCst) {
            self.refresh_resumed.notified().await;
        }
        if self.reject_refresh.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let users = self.users.lock().unwrap();
        let user = users
            .iter()
            .find(|(_, user)| format!("refresh-{}", user.sub) == refresh_token);

        Ok(user.map(|(username, user)| self.tokens_for(username, &user.sub, 3600, false)))
    }

    async fn sign_up(
        &self,
        username: &str,
        password: &str,
        _email: &str,
    ) -> anyhow::Result<SignUpResponse> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(username) {
            bail!("Sign up failed");
        }

        let sub = format!("sub-{}", users.len() + 1);
        users.insert(
            username.to_string(),
            FakeUser {
                password: password.to_string(),
                sub: sub.clone(),
                confirmed: false,
            },
        );

        Ok(SignUpResponse {
            user_sub: sub,
            user_confirmed: false,
        })
    }

    async fn confirm_sign_up(&self, username: &str, code: &str) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(username) {
            Some(user) if code == CONFIRMATION_CODE => {
                user.confirmed = true;
                Ok(())
            }
            Some(_) => bail!("Invalid verification code provided"),
            None => bail!("Username/client id combination not found"),
        }
    }

    async fn global_sign_out(&self, _access_token: &str) -> anyhow::Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            bail!("Network error");
        }

        Ok(())
    }
}

/// An identity pool handing out fixed credentials.
#[derive(Default)]
pub(crate) struct FakeIdentityPool {
    logins_per_request: Mutex<Vec<usize>>,
    fail: bool,
}

impl FakeIdentityPool {
    pub(crate) fn failing() -> Self {
        FakeIdentityPool {
            fail: true,
            ..Self::default()
        }
    }

    /// Returns the number of logins sent with each identity lookup.
    pub(crate) fn requested_logins(&self) -> Vec<usize> {
        self.logins_per_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityPoolClient for FakeIdentityPool {
    async fn get_id(
        &self,
        identity_pool_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        if self.fail {
            bail!("Identity pool unavailable");
        }
        self.logins_per_request.lock().unwrap().push(logins.len());

        Ok(format!("{}-identity", identity_pool_id))
    }

    async fn get_credentials(
        &self,
        _identity_id: &str,
        logins: &BTreeMap<String, String>,
    ) -> anyhow::Result<Credentials> {
        let access_key_id = if logins.is_empty() {
            "AKIDguest"
        } else {
            "AKIDauthenticated"
        };

        Ok(Credentials::new(
            access_key_id,
            "secret",
            Some("session".to_string()),
            None,
            "FakeIdentityPool",
        ))
    }
}
