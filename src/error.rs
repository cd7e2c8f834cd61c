// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::providers::ProviderId;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A provider API call failed. `status` is `None` for transport
    /// failures (timeout, DNS, TLS) and malformed bodies.
    #[error("{provider} API error ({}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "no status".to_string()))]
    Provider {
        provider: ProviderId,
        status: Option<u16>,
        message: String,
    },

    /// Manual verification did not pass. The message is shown to the user as-is.
    #[error("{0}")]
    VerificationFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Task queue error: {0}")]
    Tasks(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build a provider error from an HTTP status and body.
    pub fn provider(provider: ProviderId, status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider,
            status,
            message: message.into(),
        }
    }

    /// HTTP status reported by the provider, if any.
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            AppError::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// True for rate limits and provider-side outages (429 / 5xx).
    ///
    /// These trip the provider-wide backoff flag instead of counting
    /// against the connection.
    pub fn is_transient(&self) -> bool {
        matches!(self.provider_status(), Some(s) if s == 429 || s >= 500)
    }

    /// True when the provider rejected our credentials.
    pub fn is_token_error(&self) -> bool {
        matches!(self.provider_status(), Some(401))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Provider { .. } => {
                tracing::warn!(error = %self, "Provider error surfaced to client");
                (StatusCode::BAD_GATEWAY, "provider_error", Some(self.to_string()))
            }
            AppError::VerificationFailed(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "verification_failed",
                Some(msg.clone()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "Cache error");
                (StatusCode::INTERNAL_SERVER_ERROR, "cache_error", None)
            }
            AppError::Tasks(msg) => {
                tracing::error!(error = %msg, "Task queue error");
                (StatusCode::INTERNAL_SERVER_ERROR, "task_queue_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
