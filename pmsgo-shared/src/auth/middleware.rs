/// Bearer-token authentication for Axum
///
/// Protected routes sit behind a middleware that reads
/// `Authorization: Bearer <token>`, validates the JWT and inserts an
/// [`AuthContext`] into the request extensions. Any failure ends the
/// request with `401 Unauthorized` before the handler runs.
///
/// # Example
///
/// ```no_run
/// use axum::{extract::Request, middleware::{self, Next}, routing::get, Router};
/// use pmsgo_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
///
/// async fn whoami(auth: AuthContext) -> String {
///     format!("Hello, {}!", auth.name)
/// }
///
/// let secret = "a-secret-that-is-at-least-32-bytes!".to_string();
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn(move |req: Request, next: Next| {
///         jwt_auth_middleware(secret.clone(), req, next)
///     }));
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_token, Claims, JwtError};
use crate::models::AccountType;

/// Identity of the caller, attached to authenticated requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub name: String,
    pub email: String,
    pub account_type: AccountType,
    /// Token expiry, unix seconds
    pub expires_at: i64,
}

impl AuthContext {
    /// Builds the context from validated claims
    ///
    /// Claims without a profile are rejected.
    pub fn from_claims(claims: &Claims) -> Result<Self, AuthError> {
        let profile = claims
            .profile()
            .ok_or_else(|| AuthError::InvalidToken("Token carries no account".to_string()))?;

        Ok(Self {
            account_id: profile.id,
            name: profile.name.clone(),
            email: profile.email.clone(),
            account_type: profile.account_type,
            expires_at: claims.exp,
        })
    }
}

/// Authentication failures; all of them are 401s
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("Token expired")]
    Expired,

    #[error("{0}")]
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::Expired,
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status_code": StatusCode::UNAUTHORIZED.as_u16(),
            "error": "unauthorized",
            "message": self.to_string(),
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts the token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    Ok(token)
}

/// Validates a raw token and returns the caller's identity
pub fn authenticate(token: &str, secret: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_token(token, secret)?;
    AuthContext::from_claims(&claims)
}

/// Middleware function gating a router on a valid bearer token
pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let auth = authenticate(token, &secret)?;

    tracing::debug!(account_id = %auth.account_id, "Request authenticated");
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}
