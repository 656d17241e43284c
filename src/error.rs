// Error handling module
// Defines the normalized error type and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Coarse classification callers can branch on without string matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or empty construction/call argument, detected before any I/O
    Configuration,
    /// Remote endpoint answered with a non-success status
    HttpStatus,
    /// No response was received (connectivity, timeout)
    Transport,
    /// Response body did not match the expected token schema
    Deserialization,
    /// Calling application has no usable credentials for the request
    Unauthorized,
    Internal,
}

/// Errors produced by the token manager, the API client and the web layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid construction parameters
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid call argument
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Non-success status from the token endpoint or resource API
    #[error("Request failed with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Request never produced a response
    #[error("Transport failure ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Token endpoint body could not be parsed
    #[error("Failed to deserialize token response: {message}")]
    Deserialization { message: String, body: String },

    /// Authentication failed in the calling application
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ConfigError(_) | ApiError::ValidationError(_) => ErrorKind::Configuration,
            ApiError::HttpStatus { .. } => ErrorKind::HttpStatus,
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Deserialization { .. } => ErrorKind::Deserialization,
            ApiError::AuthError(_) => ErrorKind::Unauthorized,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Upstream status code, only for `HttpStatus`
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Original provider payload, kept for diagnostics
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            ApiError::HttpStatus { body, .. } | ApiError::Deserialization { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// Transport failures are the only ones worth retrying as-is
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

/// Reject an empty call argument before any I/O
pub(crate) fn require_arg(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ApiError::ValidationError(format!(
            "{} cannot be empty",
            name
        )));
    }
    Ok(())
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // The request could not be built (bad URL, header); nothing was sent
        if e.is_builder() {
            return ApiError::ValidationError(format!("Invalid request: {}", e));
        }

        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        ApiError::Transport {
            kind,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = self.raw_body().map(str::to_string);
        let (status, error_type, message) = match self {
            ApiError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::HttpStatus { status, .. } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status_code,
                    "upstream_error",
                    format!("Upstream request failed with status {}", status),
                )
            }
            ApiError::Transport { kind, message } => (
                StatusCode::BAD_GATEWAY,
                "transport_error",
                format!("{} ({})", message, kind),
            ),
            ApiError::Deserialization { message, .. } => {
                (StatusCode::BAD_GATEWAY, "deserialization_error", message)
            }
            ApiError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "auth_error", msg),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": message,
            "type": error_type,
        });
        if let Some(details) = details {
            error["details"] = json!(details);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
