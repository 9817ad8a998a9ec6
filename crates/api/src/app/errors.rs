use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use looma_auth::{AuthzError, OpaqueIdError, Permission};
use looma_core::DomainError;
use looma_infra::StoreError;

/// Handler-level error, rendered as `{"error": code, "message": msg}`.
///
/// Everything a caller may not see collapses into [`ApiError::NotFound`]:
/// undecodable ids, missing rows, and cases the caller cannot access are
/// indistinguishable on the wire.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("missing permission {0}")]
    Forbidden(Permission),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required")
            }
            ApiError::Forbidden(permission) => json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("missing permission {permission}"),
            ),
            ApiError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error",
                )
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<AuthzError<StoreError>> for ApiError {
    fn from(err: AuthzError<StoreError>) -> Self {
        match err {
            AuthzError::Forbidden(permission) => ApiError::Forbidden(permission),
            AuthzError::Source(e) => e.into(),
        }
    }
}

impl From<OpaqueIdError> for ApiError {
    fn from(_: OpaqueIdError) -> Self {
        ApiError::NotFound
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::BadRequest(msg),
            DomainError::InvalidId(_) | DomainError::NotFound => ApiError::NotFound,
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
