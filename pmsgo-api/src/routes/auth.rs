/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/auth/signup`: create a company account
/// - `POST /api/v1/auth/signin`: exchange credentials for a 24-hour token

use crate::{
    app::AppState,
    error::{ApiJson, ApiResult},
    routes::DataResponse,
};
use axum::{extract::State, http::StatusCode, Json};
use pmsgo_shared::auth::signin::{self as signin_service, SigninRequest, SigninResponse};
use pmsgo_shared::auth::signup::{register, SignupRequest};
use pmsgo_shared::models::AccountProfile;

/// Signup handler
///
/// ```text
/// POST /api/v1/auth/signup
/// {"name": "Acme", "email": "a@x.com", "workspace_name": "Acme HQ", "password": "secret1"}
/// ```
///
/// # Errors
///
/// - 409 Conflict: "Email must be unique" (checked before anything else)
/// - 422 Unprocessable Entity: one entry per invalid field
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<AccountProfile>>)> {
    let profile = register(state.store.as_ref(), req).await?;

    tracing::info!(account_id = %profile.id, "Account registered");

    Ok((StatusCode::CREATED, Json(DataResponse::new(profile))))
}

/// Signin handler
///
/// ```text
/// POST /api/v1/auth/signin
/// {"email": "a@x.com", "password": "secret1", "type": "company"}
/// ```
///
/// Response:
/// ```json
/// {"token": "...", "data": {"id": "...", "name": "Acme", "email": "a@x.com", "type": "company"}}
/// ```
///
/// # Errors
///
/// - 401 Unauthorized: "Login Failed" for every credential problem
pub async fn signin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SigninRequest>,
) -> ApiResult<Json<SigninResponse>> {
    let response = signin_service::signin(state.store.as_ref(), req, state.jwt_secret()).await?;
    Ok(Json(response))
}
