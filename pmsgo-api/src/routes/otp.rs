/// One-time code endpoints for password recovery
///
/// # Flow
///
/// ```text
/// POST /api/v1/otp/request         {"email"}                    -> code sent out of band
/// POST /api/v1/otp/verify          {"email", "code"}            -> code marked used
/// POST /api/v1/otp/reset-password  {"email", "code", "password"} -> password replaced
/// ```
///
/// `request` answers the same way whether or not the email is registered.

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
    routes::MessageResponse,
};
use axum::{extract::State, Json};
use pmsgo_shared::models::account::normalize_email;
use pmsgo_shared::otp::{OtpPolicy, OtpService};
use pmsgo_shared::store::Store;
use pmsgo_shared::validation::field_errors;
use serde::Deserialize;
use validator::Validate;

const REQUEST_ACK: &str = "If the email is registered, a code has been sent";

#[derive(Debug, Deserialize, Validate)]
pub struct OtpRequest {
    #[validate(email(message = "Email must be a valid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub password: String,
}

fn service(state: &AppState) -> OtpService<'_, dyn Store> {
    OtpService::new(
        state.store.as_ref(),
        OtpPolicy::with_ttl_secs(state.config.otp.ttl_secs),
    )
}

/// Acknowledges immediately; lookup and issuing run in the background so
/// the response time does not depend on whether the email is registered
pub async fn request_code(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let req = OtpRequest {
        email: normalize_email(&req.email),
    };
    req.validate()
        .map_err(|e| ApiError::ValidationError(field_errors(&e)))?;

    tokio::spawn(async move {
        if let Err(e) = issue_code(&state, &req.email).await {
            tracing::error!(error = %e, "Failed to issue one-time code");
        }
    });

    Ok(Json(MessageResponse::new(REQUEST_ACK)))
}

/// Issues a code if `email` belongs to an account
///
/// Returns whether a code was issued.
pub async fn issue_code(state: &AppState, email: &str) -> Result<bool, ApiError> {
    if state.store.find_account_by_email(email).await?.is_none() {
        tracing::debug!("Code requested for unknown email");
        return Ok(false);
    }

    let issued = service(state).request(email).await?;

    // No mail transport is wired in; the code only ever reaches the logs
    // outside production.
    if state.config.api.production {
        tracing::info!(expires_at = %issued.expires_at, "One-time code issued");
    } else {
        tracing::debug!(
            email = %issued.email,
            code = %issued.code,
            expires_at = %issued.expires_at,
            "One-time code issued"
        );
    }

    Ok(true)
}

/// # Errors
///
/// - 400 Bad Request: unknown, already used, expired or locked code
pub async fn verify_code(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<Json<MessageResponse>> {
    service(&state).verify(&req.email, &req.code).await?;
    Ok(Json(MessageResponse::new("Code verified")))
}

/// Requires a code that already passed `verify`
///
/// # Errors
///
/// - 400 Bad Request: code not verified, already spent, expired or locked
/// - 404 Not Found: the account no longer exists
/// - 422 Unprocessable Entity: new password too short
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    service(&state)
        .reset_password(&req.email, &req.code, &req.password)
        .await?;

    Ok(Json(MessageResponse::new("Password updated")))
}
