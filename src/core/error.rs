//! # Error Handling Module
//!
//! This module defines every failure the gateway can produce and how each one is
//! presented to clients. Failures are resolved at the dispatcher boundary: each
//! variant maps to exactly one HTTP status and a machine-readable reason string.
//!
//! ## Failure taxonomy
//!
//! - `ServiceNotFound` -> 404, the logical service is not registered
//! - `Unauthenticated` -> 401, a protected route was called without a usable bearer credential
//! - `UpstreamTimeout` -> 504, the backend did not answer within the upstream timeout
//! - `UpstreamUnavailable` -> 502, the backend could not be reached at all
//!
//! A backend that answers with an error status is *not* a gateway failure; that
//! response is passed through untouched and never becomes a `GatewayError`.
//!
//! Client-facing messages never contain backend addresses or transport details.
//! Those stay in the `Display` output, which is only ever written to logs.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types produced by the gateway itself
///
/// The `#[error("...")]` text is the operator-facing description and may include
/// internal detail. Use [`GatewayError::client_message`] for anything sent to a caller.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// The logical service name is not present in the registry
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    /// The path is outside the `/api/{service}/...` surface
    #[error("No route for path: {path}")]
    RouteNotFound { path: String },

    /// A protected route was called without a valid bearer credential
    #[error("Not authenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The backend did not respond before the upstream timeout elapsed
    #[error("Upstream timeout for service {service} after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    /// The backend could not be reached (connection refused, DNS failure, reset, ...)
    #[error("Upstream unavailable: {service} - {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GatewayError {
    /// Create a service-not-found error for the given logical name
    pub fn service_not_found<S: Into<String>>(service: S) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
        }
    }

    /// Create an unauthenticated error with a custom reason
    pub fn unauthenticated<S: Into<String>>(reason: S) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Create an upstream-unavailable error
    pub fn upstream_unavailable<S: Into<String>, R: Into<String>>(service: S, reason: R) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable failure reason for API responses and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ServiceNotFound { .. } => "service_not_found",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
        }
    }

    /// Message safe to send to a client
    pub fn client_message(&self) -> String {
        match self {
            Self::ServiceNotFound { .. } => "Service not found".to_string(),
            Self::RouteNotFound { .. } => "Not Found".to_string(),
            Self::Unauthenticated { .. } => "Not authenticated".to_string(),
            Self::UpstreamTimeout { .. } => "Upstream service timed out".to_string(),
            Self::UpstreamUnavailable { .. } => "Upstream service unavailable".to_string(),
            Self::Configuration { .. } | Self::Internal { .. } | Self::Io { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("Failed to parse config: {}", err),
        }
    }
}

/// Convert a gateway-origin failure into the structured client response
///
/// `detail` mirrors the error shape the backend services emit, so clients can read
/// gateway failures and passed-through backend failures the same way.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.client_message();

        let body = json!({
            "detail": message,
            "error": {
                "code": status.as_u16(),
                "type": self.error_type(),
                "message": message,
            }
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
