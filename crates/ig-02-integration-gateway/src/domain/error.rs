//! Gateway error types.
//!
//! `ApiError` is what integration clients see: a stable string code, a
//! message and an HTTP status. `GatewayError` and `StoreError` stay internal
//! and surface to clients only as `internal_error`.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::config::ConfigError;

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingApiKey,
    InvalidApiKey,
    ApiKeyExpired,
    ApiKeyRevoked,
    ClientDisabled,
    IpNotAllowed,
    RateLimited,
    InvalidPattern,
    DuplicateEntry,
    WhitelistFull,
    NotFound,
    InternalError,
}

impl ErrorCode {
    /// HTTP status for this code
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingApiKey
            | ErrorCode::InvalidApiKey
            | ErrorCode::ApiKeyExpired
            | ErrorCode::ApiKeyRevoked => StatusCode::UNAUTHORIZED,
            ErrorCode::ClientDisabled | ErrorCode::IpNotAllowed => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidPattern => StatusCode::BAD_REQUEST,
            ErrorCode::DuplicateEntry => StatusCode::CONFLICT,
            ErrorCode::WhitelistFull => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Client-facing error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create error with additional data
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    // Authentication

    pub fn missing_api_key() -> Self {
        Self::new(
            ErrorCode::MissingApiKey,
            "API key required (X-API-Key header or Authorization: Bearer)",
        )
    }

    /// Unknown key, bad format or hash mismatch. Deliberately uninformative.
    pub fn invalid_api_key() -> Self {
        Self::new(ErrorCode::InvalidApiKey, "Invalid API key")
    }

    pub fn key_expired() -> Self {
        Self::new(ErrorCode::ApiKeyExpired, "API key has expired")
    }

    pub fn key_revoked() -> Self {
        Self::new(ErrorCode::ApiKeyRevoked, "API key has been revoked")
    }

    // Authorization

    pub fn client_disabled() -> Self {
        Self::new(ErrorCode::ClientDisabled, "API client is disabled")
    }

    pub fn ip_not_allowed(ip: Option<IpAddr>) -> Self {
        match ip {
            Some(ip) => Self::new(
                ErrorCode::IpNotAllowed,
                format!("Source address {} is not whitelisted for this API key", ip),
            ),
            None => Self::new(
                ErrorCode::IpNotAllowed,
                "Source address could not be determined",
            ),
        }
    }

    /// Rate limited
    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::with_data(
            ErrorCode::RateLimited,
            "Rate limit exceeded",
            serde_json::json!({
                "retry_after_ms": retry_after_ms
            }),
        )
    }

    // Whitelist management

    pub fn invalid_pattern(pattern: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidPattern,
            format!("Invalid whitelist pattern {:?}: {}", pattern, reason),
        )
    }

    pub fn duplicate_entry(pattern: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateEntry,
            format!("Whitelist already contains {}", pattern),
        )
    }

    pub fn whitelist_full(max: usize) -> Self {
        Self::new(
            ErrorCode::WhitelistFull,
            format!("Whitelist is limited to {} entries", max),
        )
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("Resource not found: {}", resource.into()),
        )
    }

    /// Internal error
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("Internal error: {}", details.into()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status().as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_ms = match (&self.code, &self.data) {
            (ErrorCode::RateLimited, Some(data)) => data["retry_after_ms"].as_u64(),
            _ => None,
        };

        let body = serde_json::json!({ "error": self });
        let mut response = Response::new(Body::from(serde_json::to_vec(&body).unwrap_or_default()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        if let Some(ms) = retry_after_ms {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ms.div_ceil(1000)));
        }

        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::not_found(what),
            StoreError::Rejected(e) => e,
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError::internal(e.to_string())
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Credential store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// An in-place edit refused to apply; the record is unchanged
    #[error("{0}")]
    Rejected(ApiError),
}

/// Gateway-level errors (not client facing)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Logging/tracing setup failed
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// HTTP server failure
    #[error("server error: {0}")]
    Server(String),
}
