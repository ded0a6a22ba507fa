//! Bearer-token authentication and role-based authorization.
//!
//! Two handlers, registered in this order ahead of whatever they protect:
//!
//! 1. [`verify_token`] reads `Authorization: Bearer <token>`, asks a
//!    [`TokenVerifier`] about it, and stores the resulting [`Claims`] in the
//!    request's extension bag. A missing, malformed or rejected credential
//!    responds `401` directly.
//! 2. [`require_role`] reads those claims back and responds `403` unless the
//!    role is in the permitted set.
//!
//! The order is the caller's responsibility; `require_role` registered
//! without `verify_token` in front of it treats every request as
//! unauthenticated.
//!
//! ```rust
//! use weir::{Chain, Request, Response, Router};
//! use weir::middleware::auth::{require_role, verify_token, Claims, StaticVerifier};
//!
//! async fn dashboard(_req: Request) -> Response { Response::text("admin area") }
//!
//! let tokens = StaticVerifier::new().with_token("t0ps3cret", Claims::new("ada", "admin"));
//! let app = Router::new().get(
//!     "/admin",
//!     Chain::new(verify_token(tokens)).then(require_role(["admin"])).then(dashboard),
//! );
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::Error;
use crate::handler::{Handler, Outcome};
use crate::request::Request;

/// Identity established by a successful verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub subject: String,
    pub role: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, role: impl Into<String>) -> Self {
        Self { subject: subject.into(), role: role.into(), extra: serde_json::Map::new() }
    }
}

/// Why a credential was not accepted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,
    #[error("token invalid: {0}")]
    Invalid(String),
}

/// The credential-checking primitive. Signature schemes live behind this
/// trait; the middleware only cares about the verdict.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<Claims, VerifyError>;
}

#[async_trait]
impl<V: TokenVerifier + ?Sized> TokenVerifier for Arc<V> {
    async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        (**self).verify(token).await
    }
}

/// A fixed token table. Useful for tests, demos and service-to-service keys.
#[derive(Clone, Debug, Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Claims>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, claims: Claims) -> Self {
        self.tokens.insert(token.to_owned(), claims);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VerifyError::Invalid("unknown token".to_owned()))
    }
}

/// Token verification using the default `Authorization: Bearer` location.
pub fn verify_token<V: TokenVerifier>(verifier: V) -> impl Handler + use<V> {
    verify_token_with(verifier, &AuthConfig::default())
}

/// Token verification reading the header and scheme from `config`.
pub fn verify_token_with<V: TokenVerifier>(verifier: V, config: &AuthConfig) -> impl Handler + use<V> {
    let verifier = Arc::new(verifier);
    let header = config.header.clone();
    let scheme = config.scheme.clone();

    move |req: Request| {
        let verifier = Arc::clone(&verifier);
        let token = bearer(&req, &header, &scheme).map(str::to_owned);
        async move {
            let Some(token) = token else {
                debug!("missing or malformed credential");
                return Outcome::Respond(Error::unauthenticated("missing credential").into_response());
            };
            match verifier.verify(&token).await {
                Ok(claims) => {
                    debug!(subject = %claims.subject, role = %claims.role, "credential accepted");
                    req.insert_extension(claims);
                    Outcome::Continue
                }
                Err(e) => {
                    debug!(error = %e, "credential rejected");
                    Outcome::Respond(Error::unauthenticated(e.to_string()).into_response())
                }
            }
        }
    }
}

/// Role check. Must run after [`verify_token`].
pub fn require_role<I, S>(roles: I) -> impl Handler
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let roles: Arc<HashSet<String>> = Arc::new(roles.into_iter().map(Into::into).collect());

    move |req: Request| {
        let outcome = match req.extension::<Claims>() {
            None => {
                warn!(path = req.path(), "role check without an identity; is verify_token registered first?");
                Outcome::Respond(Error::unauthenticated("no identity").into_response())
            }
            Some(claims) if roles.contains(&claims.role) => Outcome::Continue,
            Some(claims) => {
                debug!(subject = %claims.subject, role = %claims.role, "role not permitted");
                Outcome::Respond(Error::forbidden(format!("role `{}`", claims.role)).into_response())
            }
        };
        async move { outcome }
    }
}

/// Extracts `<token>` from `<header>: <scheme> <token>`. The scheme is
/// matched case-insensitively.
fn bearer<'r>(req: &'r Request, header: &str, scheme: &str) -> Option<&'r str> {
    let value = req.header(header)?;
    let (given, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !given.eq_ignore_ascii_case(scheme) || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
