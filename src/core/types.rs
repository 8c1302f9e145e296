//! # Core Types Module
//!
//! Request and response values that flow through the gateway. An [`InboundRequest`] is
//! created per incoming call and owned by the task handling it; a [`ForwardResult`] is
//! produced once by the forwarder and consumed once when building the client response.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Opaque bearer token taken from the `Authorization` header
///
/// The token is forwarded verbatim to protected backends and never persisted.
/// `Debug` is redacted so the value cannot end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the `Authorization` header value carrying this token
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A request received on `/api/{service}/{path...}`
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Unique identifier for this request (for tracing and logging)
    pub id: String,

    pub method: Method,

    /// Logical service name, matched against the registry
    pub service: String,

    /// Everything after `/api/{service}/`, forwarded verbatim
    pub sub_path: String,

    /// Raw query string, without the leading `?`
    pub query: Option<String>,

    pub headers: HeaderMap,

    /// Request body exactly as received
    pub body: Bytes,

    /// Timestamp when the request was received
    pub received_at: Instant,
}

impl InboundRequest {
    /// Create a new inbound request with a generated ID
    pub fn new<S: Into<String>, P: Into<String>>(
        method: Method,
        service: S,
        sub_path: P,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            service: service.into(),
            sub_path: sub_path.into(),
            query: None,
            headers,
            body,
            received_at: Instant::now(),
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }
}

/// Backend response payload after normalization
///
/// Bodies that parse as JSON are classified as such, but the bytes the backend sent
/// are kept and are what the client receives. Parsing never rewrites key order,
/// number formatting or whitespace. Anything else is an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardBody {
    Json { value: serde_json::Value, raw: Bytes },
    Text(String),
    Binary(Bytes),
}

impl ForwardBody {
    /// Normalize raw backend bytes, falling back to opaque text or binary
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::Binary(bytes);
        }
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            return Self::Json { value, raw: bytes };
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Binary(bytes),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json { .. })
    }

    /// The exact bytes the backend sent
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Json { raw, .. } => raw,
            Self::Text(text) => Bytes::from(text),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// Normalized backend response
#[derive(Debug, Clone)]
pub struct ForwardResult {
    /// Backend status, never reinterpreted by the gateway
    pub status: StatusCode,

    /// Backend `Content-Type`, if it sent one
    pub content_type: Option<HeaderValue>,

    pub body: ForwardBody,
}

impl ForwardResult {
    pub fn new(status: StatusCode, content_type: Option<HeaderValue>, body: ForwardBody) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }
}

impl IntoResponse for ForwardResult {
    fn into_response(self) -> Response {
        let content_type = match (&self.content_type, &self.body) {
            (Some(value), _) => Some(value.clone()),
            (None, body) if body.is_json() => Some(HeaderValue::from_static("application/json")),
            (None, _) => None,
        };

        let mut response = Response::new(Body::from(self.body.into_bytes()));
        *response.status_mut() = self.status;
        if let Some(content_type) = content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}
