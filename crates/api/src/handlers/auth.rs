use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::auth::{is_reasonable_email, issue_token, normalize_email, verify_password, AuthUser};
use crate::error::{AppError, AppResult};
use crate::extract::ValidJson;
use crate::models::{LoginRequest, TokenResponse};
use crate::users;
use crate::AppState;

fn invalid_credentials() -> AppError {
    AppError::field("auth_token", "Invalid credentials.")
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let email = normalize_email(&payload.email);
    if !is_reasonable_email(&email) || payload.password.is_empty() || payload.password.len() > 128 {
        return Err(invalid_credentials());
    }

    let Some(user) = users::fetch_by_email(&state.db, &email).await? else {
        return Err(invalid_credentials());
    };

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        tracing::info!("Rejected login for {}", email);
        return Err(invalid_credentials());
    }

    let auth_token = issue_token(
        &state.config.jwt_secret,
        user.id,
        &user.email,
        state.config.token_ttl_minutes,
    )?;
    tracing::info!("User {} logged in", user.id);
    Ok(Json(TokenResponse { auth_token }))
}

/// Tokens are stateless; logging out is acknowledged for authenticated callers.
pub async fn logout(user: AuthUser) -> impl IntoResponse {
    tracing::info!("User {} logged out", user.id);
    StatusCode::NO_CONTENT
}
