//! Public authentication endpoints: signup, login and forgot-password.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use super::error::{ApiError, ErrorCode};
use crate::auth::{LockoutStatus, Refusal};
use crate::db::{
    AccountResponse, ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    SignupRequest,
};
use crate::notifications::RecoveryMessage;
use crate::AppState;

/// Create an account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    request.validate()?;

    let account = state
        .accounts()
        .create(
            request.username.trim(),
            request.email.trim(),
            &request.password,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// Exchange a username and password for a signed token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = request.username.trim();
    let now = Utc::now();

    let attempt = match state.throttle.begin(username, now) {
        Ok(attempt) => attempt,
        Err(refusal) => {
            let retry_after = match refusal {
                Refusal::Locked { until } => (until - now).num_seconds().max(1) as u64,
                Refusal::Saturated => 1,
            };
            tracing::warn!(username = %username, retry_after, "Login refused by throttle");
            return Err(
                ApiError::rate_limited("Too many failed login attempts. Try again later.")
                    .with_retry_after(retry_after),
            );
        }
    };

    let account = match state.accounts().find_by_username(username).await? {
        Some(account) => account,
        None => {
            log_failure(username, attempt.fail(Utc::now()));
            return Err(ApiError::not_found("User not found"));
        }
    };

    let valid = state
        .credentials
        .verify_blocking(request.password, account.password_hash.clone())
        .await;
    if !valid {
        log_failure(username, attempt.fail(Utc::now()));
        return Err(ApiError::new(
            ErrorCode::InvalidCredentials,
            "Invalid password",
        ));
    }

    attempt.succeed();
    let token = state.tokens.issue(account.id, &account.username)?;

    tracing::info!(user_id = account.id, username = %account.username, "User logged in");
    Ok(Json(LoginResponse { token }))
}

fn log_failure(username: &str, status: LockoutStatus) {
    if let LockoutStatus::Open { remaining_attempts } = status {
        tracing::info!(username = %username, remaining_attempts, "Failed login attempt");
    }
}

/// Send the account's login details to its registered address
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::validation_field("email", "Email is required"));
    }

    let account = state
        .accounts()
        .find_by_email(email)
        .await?
        .ok_or_else(|| ApiError::not_found("No account is registered with that email"))?;

    let message = RecoveryMessage {
        to_email: account.email,
        username: account.username,
    };
    state.mailer.send_recovery(&message).await?;

    Ok(Json(MessageResponse {
        message: "Recovery email sent".to_string(),
    }))
}
