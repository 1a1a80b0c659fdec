/// Session tokens
///
/// Signin issues an HS256 JWT whose `data` claim carries the account's
/// profile projection (`{id, name, email, type}`). Tokens live for exactly
/// 24 hours and are validated with zero leeway.
///
/// # Example
///
/// ```
/// use pmsgo_shared::auth::jwt::{create_token, validate_token, Claims};
/// use pmsgo_shared::models::{AccountProfile, AccountType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let profile = AccountProfile {
///     id: Uuid::new_v4(),
///     name: "Acme".to_string(),
///     email: "a@x.com".to_string(),
///     account_type: AccountType::Company,
/// };
///
/// let secret = "a-secret-that-is-at-least-32-bytes!";
/// let token = create_token(&Claims::new(profile.clone()), secret)?;
/// let claims = validate_token(&token, secret)?;
/// assert_eq!(claims.profile(), Some(&profile));
/// # Ok(())
/// # }
/// ```

use crate::models::AccountProfile;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Value of the `iss` claim
pub const ISSUER: &str = "pmsgo";

/// Token lifetime in seconds
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Token has expired")]
    Expired,

    /// Bad signature, wrong issuer, malformed token or unusable payload
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer, always [`ISSUER`]
    pub iss: String,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expiration (Unix seconds), `iat + 86400`
    pub exp: i64,

    /// Profile of the signed-in account
    ///
    /// Kept as an array for compatibility with existing clients, which read
    /// `data[0]`. Signin always puts exactly one profile here.
    pub data: Vec<AccountProfile>,
}

impl Claims {
    /// Claims issued now for one account
    pub fn new(profile: AccountProfile) -> Self {
        Self::issued_at(profile, Utc::now().timestamp())
    }

    /// Claims issued at a given Unix timestamp
    pub fn issued_at(profile: AccountProfile, iat: i64) -> Self {
        Self {
            iss: ISSUER.to_string(),
            iat,
            exp: iat + Duration::seconds(TOKEN_TTL_SECS).num_seconds(),
            data: vec![profile],
        }
    }

    /// The embedded profile, if any
    pub fn profile(&self) -> Option<&AccountProfile> {
        self.data.first()
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, issuer and expiry, then returns the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid(e.to_string()),
    })?;

    Ok(token_data.claims)
}
