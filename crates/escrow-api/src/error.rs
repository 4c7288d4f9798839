//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`SyncError`] to HTTP status codes and JSON bodies of the form
//! `{"error": {"code", "message", "details"?}}`.
//!
//! | `SyncError` | Status | Code |
//! |-------------|--------|------|
//! | `InvalidInput` | 400 | `VALIDATION_ERROR` |
//! | `NotFound`, `UnknownLedgerHash` | 404 | `NOT_FOUND` |
//! | `NoLedgerRecord` | 404 | `NO_LEDGER_RECORD` |
//! | `AlreadySynced`, `SyncInProgress` | 409 | `CONFLICT` |
//! | `LedgerNotConfigured` | 503 | `SERVICE_UNAVAILABLE` |
//! | `Payload` | 500 | `INTERNAL_ERROR` (message hidden) |
//! | everything else | 500 | `OPERATION_FAILED` |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use escrow_sync::SyncError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "NO_LEDGER_RECORD").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// The transaction exists but was never mirrored to the ledger (404).
    #[error("{0}")]
    NoLedgerRecord(String),

    /// Required input missing or malformed (400).
    #[error("{0}")]
    Validation(String),

    /// Request body or query could not be parsed (400).
    #[error("{0}")]
    BadRequest(String),

    /// Feature not available on this tier (403).
    #[error("{0}")]
    Forbidden(String),

    /// Conflict with the record's current sync state (409).
    #[error("{0}")]
    Conflict(String),

    /// A collaborator failed (500). The message is caller-safe; the cause
    /// is logged where the error is converted.
    #[error("{0}")]
    OperationFailed(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// Service dependency not configured (503).
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::NoLedgerRecord(_) => (StatusCode::NOT_FOUND, "NO_LEDGER_RECORD"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::OperationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "OPERATION_FAILED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    /// Construct a service unavailable error (503).
    pub fn service_unavailable(msg: &str) -> Self {
        Self::ServiceUnavailable(msg.to_string())
    }

    /// Construct a forbidden error (403).
    pub fn forbidden(msg: &str) -> Self {
        Self::Forbidden(msg.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Render an error and its source chain as one line for logs.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match &err {
            SyncError::InvalidInput(_) => Self::Validation(err.to_string()),
            SyncError::NotFound { .. } | SyncError::UnknownLedgerHash { .. } => {
                Self::NotFound(err.to_string())
            }
            SyncError::NoLedgerRecord { .. } => Self::NoLedgerRecord(err.to_string()),
            SyncError::AlreadySynced { .. } | SyncError::SyncInProgress { .. } => {
                Self::Conflict(err.to_string())
            }
            SyncError::LedgerNotConfigured => Self::ServiceUnavailable(err.to_string()),
            SyncError::Payload(_) => Self::Internal(error_chain(&err)),
            SyncError::Persistence { .. }
            | SyncError::LedgerSync(_)
            | SyncError::LedgerQuery(_)
            | SyncError::RetryExhausted { .. } => {
                tracing::error!(error = %error_chain(&err), "escrow operation failed");
                Self::OperationFailed(err.to_string())
            }
        }
    }
}
