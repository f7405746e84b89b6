use core::fmt;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status_code: StatusCode,
    pub body: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, error: impl Into<String>) -> Self {
        let body = serde_json::to_string(&ErrorBody {
            error: error.into(),
            retry_after: None,
        })
        .expect("error body always serializes");
        Self { status_code, body }
    }

    pub fn rate_limited(retry_after_secs: i64) -> Self {
        let body = serde_json::to_string(&ErrorBody {
            error: "rate_limited".to_string(),
            retry_after: Some(retry_after_secs),
        })
        .expect("error body always serializes");
        Self {
            status_code: StatusCode::TOO_MANY_REQUESTS,
            body,
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{resource} not found"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        tracing::error!(error = %message, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<i64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        (
            status_code,
            [(header::CONTENT_TYPE, "application/json")],
            self.body,
        )
            .into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API Error {}: {}", self.status_code, self.body)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::new(StatusCode::NOT_FOUND, "not_found"),
            StoreError::Conflict(msg) => ApiError::new(StatusCode::CONFLICT, msg),
            StoreError::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            StoreError::Db(err) => ApiError::internal(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"),
            AuthError::Invalid => ApiError::new(StatusCode::UNAUTHORIZED, "auth_invalid"),
            AuthError::MissingScope(scope) => {
                ApiError::new(StatusCode::FORBIDDEN, format!("auth_scope: missing {scope}"))
            }
            AuthError::RateLimited { retry_after_secs } => {
                ApiError::rate_limited(retry_after_secs)
            }
            AuthError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        ApiError::from(self).into_response()
    }
}
