use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Field-keyed validation messages, serialized as `{"field": ["msg", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> AppResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed on: {}", .0.fields().collect::<Vec<_>>().join(", "))]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    /// Removing an association that does not exist.
    #[error("{0}")]
    NotMember(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found() -> Self {
        Self::NotFound("Not found.".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::NotMember(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) | AppError::InvalidPage => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::not_found();
        }
        let Some(db_err) = err.as_database_error() else {
            return AppError::Database(err);
        };
        let constraint = db_err.constraint().unwrap_or_default();
        if db_err.is_unique_violation() {
            return unique_violation(constraint);
        }
        if db_err.is_check_violation() {
            return match constraint {
                "no_self_subscription" => {
                    AppError::Conflict("You cannot subscribe to yourself.".to_string())
                }
                _ => AppError::field("non_field_errors", "Value is out of the allowed range."),
            };
        }
        if db_err.is_foreign_key_violation() {
            return foreign_key_violation(constraint);
        }
        AppError::Database(err)
    }
}

fn foreign_key_violation(constraint: &str) -> AppError {
    match constraint {
        "recipe_ingredients_ingredient_id_fkey" => {
            AppError::field("ingredients", "Ingredients do not exist.")
        }
        _ => AppError::NotFound("Referenced object does not exist.".to_string()),
    }
}

fn unique_violation(constraint: &str) -> AppError {
    match constraint {
        "users_email_key" => AppError::field("email", "A user with that email already exists."),
        "users_username_key" => {
            AppError::field("username", "A user with that username already exists.")
        }
        "unique_favorite" => AppError::Conflict("Recipe is already in favorites.".to_string()),
        "unique_shopping_cart" => {
            AppError::Conflict("Recipe is already in the shopping cart.".to_string())
        }
        "unique_subscription" => {
            AppError::Conflict("You are already subscribed to this author.".to_string())
        }
        "unique_recipe_ingredient" => AppError::field("ingredients", "Ingredients must not repeat."),
        "unique_ingredient" => AppError::Conflict("Ingredient already exists.".to_string()),
        other => AppError::Conflict(format!("Duplicate value violates {other}.")),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => serde_json::to_value(errors).unwrap_or_default(),
            AppError::Conflict(msg) | AppError::NotMember(msg) => {
                serde_json::json!({ "errors": msg })
            }
            AppError::Database(e) => {
                tracing::error!("Database failure: {}", e);
                serde_json::json!({ "detail": "Internal server error." })
            }
            AppError::Internal(e) => {
                tracing::error!("Internal failure: {:#}", e);
                serde_json::json!({ "detail": "Internal server error." })
            }
            other => serde_json::json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_are_keyed_by_field() {
        let mut errors = FieldErrors::new();
        errors.add("ingredients", "Ingredients must not repeat.");
        errors.add("cooking_time", "Ensure this value is greater than or equal to 1.");

        let (status, body) = body_json(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ingredients"][0], "Ingredients must not repeat.");
        assert!(body["cooking_time"].is_array());
    }

    #[tokio::test]
    async fn conflict_and_missing_association_are_bad_requests() {
        let (status, body) = body_json(AppError::Conflict("dup".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"], "dup");

        let (status, _) = body_json(AppError::NotMember("gone".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(AppError::Internal(anyhow::anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal server error.");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_field_errors_pass() {
        assert!(FieldErrors::new().into_result().is_ok());
        let err = FieldErrors::single("image", "required").into_result().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.contains("image")));
    }

    #[test]
    fn vanished_ingredient_is_an_ingredients_error() {
        assert!(matches!(
            foreign_key_violation("recipe_ingredients_ingredient_id_fkey"),
            AppError::Validation(ref e) if e.contains("ingredients")
        ));
        assert!(matches!(
            foreign_key_violation("favorites_recipe_id_fkey"),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn unique_constraints_map_to_domain_errors() {
        assert!(matches!(unique_violation("unique_favorite"), AppError::Conflict(_)));
        assert!(matches!(
            unique_violation("users_email_key"),
            AppError::Validation(ref e) if e.contains("email")
        ));
    }
}
