//! Self-service endpoints for the authenticated caller's own account.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::accounts::{authorize_owner, AccountUpdate};
use crate::auth::Identity;
use crate::db::{AccountResponse, UpdateAccountRequest};
use crate::AppState;

/// Get the caller's profile
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .accounts()
        .find_by_id(identity.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    Ok(Json(AccountResponse::from(account)))
}

/// Partially update the caller's account
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(username): Path<String>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    authorize_owner(&identity, &username)?;
    request.validate()?;

    let account = state
        .accounts()
        .update_fields(&identity, &username, AccountUpdate::from(request))
        .await?;

    Ok(Json(AccountResponse::from(account)))
}

/// Delete the caller's account
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<StatusCode, ApiError> {
    state.accounts().delete_account(&identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
