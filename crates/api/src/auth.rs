use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tokio::task;

use crate::error::{AppError, AppResult};
use crate::models::Claims;
use crate::AppState;

/// Accepted `Authorization` schemes.
const AUTH_SCHEMES: [&str; 2] = ["Token ", "Bearer "];

pub fn issue_token(secret: &str, user_id: i64, email: &str, ttl_minutes: i64) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(ttl_minutes))
        .ok_or_else(|| anyhow::anyhow!("token expiry overflows"))?
        .timestamp() as usize;

    let claims = Claims {
        user_id,
        email: email.to_owned(),
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
}

pub fn verify_token(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthenticated("Given token not valid for any token type.".to_string()))
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    AUTH_SCHEMES
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn hash_password(password: String) -> AppResult<String> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| anyhow::anyhow!("Password hashing worker failed: {e}"))?
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {e}")))
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let is_valid = task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed_hash) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Password verification worker failed: {e}"))?;
    Ok(is_valid)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn is_reasonable_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    parts.next().is_none()
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// An authenticated requester. Rejects with 401 when no valid token is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

/// Requester that may be anonymous. A token that is present but invalid is still a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeUser(None));
        };
        let claims = verify_token(&state.config.jwt_secret, token)?;
        Ok(MaybeUser(Some(AuthUser {
            id: claims.user_id,
            email: claims.email,
        })))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        MaybeUser::from_request_parts(parts, state)
            .await?
            .0
            .ok_or_else(|| {
                AppError::Unauthenticated(
                    "Authentication credentials were not provided.".to_string(),
                )
            })
    }
}
