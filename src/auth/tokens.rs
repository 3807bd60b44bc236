//! Verification of ID tokens issued by a Cognito user pool.

use crate::auth::jwks::{JwksCache, JwksFetcher, UrlJwksFetcher, user_pool_jwks_url};
use crate::error::{ErrorKind, ResultExt};
use crate::kind_bail;
use anyhow::Context;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;

const TOKEN_USE_ID: &str = "id";

/// The claims of an ID token which are relevant to this crate.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(rename = "cognito:username")]
    pub username: Option<String>,
    pub email: Option<String>,
    pub token_use: Option<String>,
    pub exp: i64,
}

/// Checks signature, issuer, audience and expiry of ID tokens.
pub struct IdTokenVerifier {
    jwks: JwksCache,
    validation: Validation,
}

impl IdTokenVerifier {
    /// Creates a verifier which fetches the signing keys from the user pool itself.
    pub fn for_user_pool(region: &str, user_pool_id: &str, client_id: &str) -> Self {
        Self::with_fetcher(
            Box::new(UrlJwksFetcher::new(user_pool_jwks_url(region, user_pool_id))),
            region,
            user_pool_id,
            client_id,
            &[Algorithm::RS256],
        )
    }

    pub(crate) fn with_fetcher(
        fetcher: Box<dyn JwksFetcher>,
        region: &str,
        user_pool_id: &str,
        client_id: &str,
        algorithms: &[Algorithm],
    ) -> Self {
        let mut validation = Validation::default();
        validation.algorithms = algorithms.to_vec();
        validation.set_issuer(&[format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            region, user_pool_id
        )]);
        validation.set_audience(&[client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        IdTokenVerifier {
            jwks: JwksCache::new(fetcher),
            validation,
        }
    }

    /// Verifies the token and returns its claims.
    pub async fn verify(&self, id_token: &str) -> anyhow::Result<IdTokenClaims> {
        let header = decode_header(id_token)
            .context("Invalid ID token")
            .with_kind(ErrorKind::Unauthenticated)?;

        if !self.validation.algorithms.contains(&header.alg) {
            kind_bail!(
                ErrorKind::Unauthenticated,
                "Invalid ID token: Unsupported algorithm: {:?}",
                header.alg
            );
        }

        let Some(kid) = &header.kid else {
            kind_bail!(ErrorKind::Unauthenticated, "Invalid ID token: Missing key id");
        };
        let key = self
            .jwks
            .key(kid)
            .await
            .context("Cannot determine the signing key of the ID token")?;

        let mut validation = self.validation.clone();
        validation.algorithms = vec![header.alg];

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
            .context("Invalid ID token")
            .with_kind(ErrorKind::Unauthenticated)?
            .claims;

        if claims
            .token_use
            .as_deref()
            .is_some_and(|token_use| token_use != TOKEN_USE_ID)
        {
            kind_bail!(
                ErrorKind::Unauthenticated,
                "Invalid ID token: Unexpected token use"
            );
        }

        Ok(claims)
    }
}
