/// The caller's own account
///
/// # Endpoints
///
/// - `GET /api/v1/users/me`
/// - `PATCH /api/v1/users/me`: change `name` and/or `workspace_name`

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
    routes::DataResponse,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use pmsgo_shared::auth::middleware::AuthContext;
use pmsgo_shared::models::{Account, AccountChanges, AccountType};
use pmsgo_shared::validation::field_errors;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Account as shown to its owner
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(rename = "type")]
    pub account_type: AccountType,

    pub workspace_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for UserResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            email: account.email,
            account_type: account.account_type,
            workspace_name: account.workspace_name,
            created_at: account.created_at,
        }
    }
}

/// Profile update body
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Workspace name must be 1-255 characters"
    ))]
    pub workspace_name: Option<String>,
}

impl UpdateProfileRequest {
    fn into_changes(self) -> Result<AccountChanges, ApiError> {
        let trimmed = UpdateProfileRequest {
            name: self.name.map(|v| v.trim().to_string()),
            workspace_name: self.workspace_name.map(|v| v.trim().to_string()),
        };

        trimmed
            .validate()
            .map_err(|e| ApiError::ValidationError(field_errors(&e)))?;

        Ok(AccountChanges {
            name: trimmed.name,
            workspace_name: trimmed.workspace_name,
        })
    }
}

pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<DataResponse<UserResponse>>> {
    let account = state
        .store
        .find_account(auth.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    Ok(Json(DataResponse::new(account.into())))
}

/// # Errors
///
/// - 400 Bad Request: nothing to change
/// - 422 Unprocessable Entity: empty or overlong fields
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<DataResponse<UserResponse>>> {
    let changes = req.into_changes()?;
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No changes supplied".to_string()));
    }

    let account = state
        .store
        .update_account(auth.account_id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    tracing::info!(account_id = %account.id, "Profile updated");

    Ok(Json(DataResponse::new(account.into())))
}
