/// Signin
///
/// Looks up accounts by `(email, type)`, requires exactly one match,
/// verifies the password against the stored Argon2id hash and mints a
/// 24-hour token. Every failure, including store errors, collapses into a
/// single `Login Failed` so callers cannot tell an unknown account from a
/// wrong password.

use serde::{Deserialize, Serialize};

use super::jwt::{create_token, Claims, JwtError};
use super::password::verify_password_async;
use crate::models::account::normalize_email;
use crate::models::{AccountProfile, AccountType};
use crate::store::AccountStore;

/// Message reported for every failed signin
pub const LOGIN_FAILED_MESSAGE: &str = "Login Failed";

/// Signin body
#[derive(Debug, Clone, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,

    /// Account discriminator, e.g. `company`
    #[serde(rename = "type")]
    pub account_type: String,
}

/// Successful signin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninResponse {
    pub token: String,
    pub data: AccountProfile,
}

#[derive(Debug, thiserror::Error)]
pub enum SigninError {
    #[error("{}", LOGIN_FAILED_MESSAGE)]
    LoginFailed,

    #[error(transparent)]
    Token(#[from] JwtError),
}

/// Authenticates credentials and issues a token
pub async fn signin<S>(
    store: &S,
    req: SigninRequest,
    secret: &str,
) -> Result<SigninResponse, SigninError>
where
    S: AccountStore + ?Sized,
{
    let Ok(account_type) = req.account_type.trim().parse::<AccountType>() else {
        tracing::debug!(account_type = %req.account_type, "Signin with unknown account type");
        return Err(SigninError::LoginFailed);
    };

    let email = normalize_email(&req.email);

    // Two rows are enough to tell "exactly one" from "ambiguous"
    let mut accounts = store
        .find_accounts_for_signin(&email, account_type, 2)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Signin lookup failed");
            SigninError::LoginFailed
        })?;

    if accounts.len() != 1 {
        tracing::debug!(matches = accounts.len(), "Signin rejected");
        return Err(SigninError::LoginFailed);
    }
    let account = accounts.remove(0);

    match verify_password_async(req.password, account.password_hash.clone()).await {
        Ok(true) => {}
        Ok(false) => return Err(SigninError::LoginFailed),
        Err(e) => {
            tracing::warn!(account_id = %account.id, error = %e, "Stored password hash unusable");
            return Err(SigninError::LoginFailed);
        }
    }

    let profile = account.profile();
    let token = create_token(&Claims::new(profile.clone()), secret)?;

    tracing::info!(account_id = %profile.id, "Signin succeeded");

    Ok(SigninResponse {
        token,
        data: profile,
    })
}
