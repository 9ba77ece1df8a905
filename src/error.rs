use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::filebrowser::FileBrowserError;
use crate::runtime::LifecycleError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    Conflict(String),
    PaymentRequired(String),
    Locked(String),
    Unprocessable(String),
    RateLimited(String),
    BadGateway(String),
    Unavailable(String),
    Timeout(String),
    Internal(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::PaymentRequired(msg) => write!(f, "Payment Required: {msg}"),
            AppError::Locked(msg) => write!(f, "Locked: {msg}"),
            AppError::Unprocessable(msg) => write!(f, "Unprocessable: {msg}"),
            AppError::RateLimited(msg) => write!(f, "Rate Limited: {msg}"),
            AppError::BadGateway(msg) => write!(f, "Bad Gateway: {msg}"),
            AppError::Unavailable(msg) => write!(f, "Unavailable: {msg}"),
            AppError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::Locked(msg) => (StatusCode::LOCKED, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            dup @ StoreError::DuplicateName(_) => AppError::Conflict(dup.to_string()),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let msg = err.to_string();
        match err {
            LifecycleError::AlreadyRunning
            | LifecycleError::NotRunning
            | LifecycleError::ProcessVanished => AppError::Conflict(msg),
            LifecycleError::EnvironmentMissing
            | LifecycleError::ScriptMissing(_)
            | LifecycleError::BelowFreeTier
            | LifecycleError::InvalidInput(_) => AppError::BadRequest(msg),
            LifecycleError::InstallFailed(_) | LifecycleError::EnvironmentSetup(_) => {
                AppError::Unprocessable(msg)
            }
            LifecycleError::StartTimedOut(_) => AppError::Timeout(msg),
            LifecycleError::AccessDenied => AppError::Forbidden(msg),
            LifecycleError::Locked => AppError::Locked(msg),
            LifecycleError::QuotaExceeded { .. } => AppError::PaymentRequired(msg),
            LifecycleError::TenantNotFound | LifecycleError::ProjectNotFound => {
                AppError::NotFound(msg)
            }
            LifecycleError::Io(e) => AppError::Internal(format!("I/O error: {e}")),
            LifecycleError::Store(e) => e.into(),
        }
    }
}

impl From<FileBrowserError> for AppError {
    fn from(err: FileBrowserError) -> Self {
        AppError::BadGateway(err.to_string())
    }
}
