use std::fmt;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{header::HOST, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Scheme and host the client used to reach us, for absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(pub String);

impl Origin {
    pub fn from_parts(parts: &Parts) -> Self {
        let scheme = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v == "http" || v == "https")
            .unwrap_or_else(|| "http".to_string());
        let host = parts
            .headers
            .get("x-forwarded-host")
            .or_else(|| parts.headers.get(HOST))
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost")
            .to_string();
        Origin(format!("{scheme}://{host}"))
    }

    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Origin::from_parts(parts))
    }
}

/// `Json` whose rejections come back as field-keyed validation errors.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::field("non_field_errors", rejection.body_text()))?;
        Ok(ValidJson(value))
    }
}

/// `Query` whose rejections come back as field-keyed validation errors.
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::field("query", rejection.body_text()))?;
        Ok(ValidQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn origin_prefers_forwarded_headers() {
        let p = parts(
            HttpRequest::builder()
                .uri("/recipes/")
                .header("host", "internal:8000")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "foodgram.example"),
        );
        assert_eq!(Origin::from_parts(&p).0, "https://foodgram.example");
    }

    #[test]
    fn origin_falls_back_to_host_header() {
        let p = parts(HttpRequest::builder().uri("/").header("host", "localhost:8000"));
        let origin = Origin::from_parts(&p);
        assert_eq!(origin.0, "http://localhost:8000");
        assert_eq!(origin.join("/media/a.png"), "http://localhost:8000/media/a.png");
    }
}
