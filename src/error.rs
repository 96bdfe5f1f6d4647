//! Unified application error model and mapping helpers.
//! Domain errors from identity, ingestion and storage all funnel into `AppError`,
//! which owns the HTTP status mapping and the JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::{AuthError, DeviceTokenError, LoginError};
use crate::security::CredentialError;
use crate::ingest::IngestError;
use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::not_found("not_found", "record not found"),
            StoreError::AlreadyExists => AppError::conflict("conflict", "record already exists"),
            StoreError::Backend(detail) => {
                // Detail stays in the log; callers only see a generic failure.
                tracing::error!(error = %detail, "persistence failure");
                AppError::internal("internal", "internal server error")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => AppError::auth("unauthorized", "Invalid or expired token"),
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "authentication backend failure");
                AppError::internal("internal", "Authentication error")
            }
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        tracing::error!(error = %err, "credential hashing failure");
        AppError::internal("internal", "internal server error")
    }
}

impl From<LoginError> for AppError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::InvalidCredentials => AppError::auth("invalid_credentials", "Invalid email or password"),
            LoginError::Store(inner) => inner.into(),
            LoginError::Token(inner) => {
                tracing::error!(error = %inner, "session token signing failed");
                AppError::internal("internal", "Error generating token")
            }
        }
    }
}

impl From<DeviceTokenError> for AppError {
    fn from(err: DeviceTokenError) -> Self {
        match err {
            DeviceTokenError::NotFound => AppError::auth("unauthorized", "Invalid or expired token"),
            DeviceTokenError::Store(StoreError::AlreadyExists) => {
                tracing::error!("device token collisions exhausted registration attempts");
                AppError::internal("internal", "Error creating device")
            }
            DeviceTokenError::Store(inner) => inner.into(),
            DeviceTokenError::Entropy(detail) => {
                tracing::error!(error = %detail, "device token generation failed");
                AppError::internal("internal", "Error generating device token")
            }
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::NotFound => AppError::not_found("signal_not_found", message.as_str()),
            IngestError::Forbidden => AppError::forbidden("device_mismatch", message.as_str()),
            IngestError::MissingField(_) => AppError::user("missing_field", message.as_str()),
            IngestError::OutOfRange { .. } => AppError::user("out_of_range", message.as_str()),
            IngestError::Store(inner) => inner.into(),
        }
    }
}
