//! # Upstream Forwarder
//!
//! Sends one outbound HTTP request per inbound request and normalizes the reply.
//!
//! A single `reqwest::Client` is built at startup and shared by every request task.
//! The client owns an internally synchronized keep-alive pool, so connections to a
//! backend are reused instead of being opened per call. Every exchange is bounded by
//! the upstream timeout and is attempted exactly once.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use metrics::histogram;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::config::{GatewayConfig, TimeoutConfig, UpstreamPoolConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{Credential, ForwardBody, ForwardResult, InboundRequest};

/// Header carrying the gateway request id to backends and back to clients
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Transport-level failure talking to a backend
///
/// A backend that answers with any HTTP status is not a transport failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("upstream did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("upstream connection failed: {reason}")]
    Connect { reason: String },
}

impl TransportError {
    /// Convert into the client-facing gateway error for `service`
    pub fn into_gateway_error(self, service: &str) -> GatewayError {
        match self {
            Self::Timeout { timeout_ms } => GatewayError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms,
            },
            Self::Connect { reason } => GatewayError::upstream_unavailable(service, reason),
        }
    }
}

/// Something that can carry a classified request to a backend
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward `request` to `base_address`, attaching `credential` when present
    async fn forward(
        &self,
        base_address: &str,
        request: &InboundRequest,
        credential: Option<&Credential>,
    ) -> Result<ForwardResult, TransportError>;
}

/// HTTP forwarder backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    upstream_timeout: Duration,
}

impl Forwarder {
    /// Build the shared client
    ///
    /// Redirects are not followed; a backend redirect is returned to the caller like
    /// any other status.
    pub fn new(timeouts: &TimeoutConfig, pool: &UpstreamPoolConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeouts.upstream_timeout)
            .connect_timeout(timeouts.connect_timeout)
            .pool_max_idle_per_host(pool.max_idle_per_host)
            .pool_idle_timeout(pool.idle_timeout)
            .tcp_keepalive(pool.tcp_keepalive)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upstream_timeout: timeouts.upstream_timeout,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::new(&config.server.timeouts, &config.upstream_pool)
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    fn map_transport_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.upstream_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Connect {
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Upstream for Forwarder {
    async fn forward(
        &self,
        base_address: &str,
        request: &InboundRequest,
        credential: Option<&Credential>,
    ) -> Result<ForwardResult, TransportError> {
        let url = build_url(base_address, &request.sub_path, request.query.as_deref());
        let headers = outbound_headers(&request.headers, credential, &request.id);
        let started = Instant::now();

        debug!(
            request_id = %request.id,
            service = %request.service,
            method = %request.method,
            authenticated = credential.is_some(),
            "Forwarding request upstream"
        );

        let outcome = async {
            let response = self
                .client
                .request(request.method.clone(), &url)
                .headers(headers)
                .body(request.body.clone())
                .send()
                .await?;

            let status = response.status();
            let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>(ForwardResult::new(
                status,
                content_type,
                ForwardBody::from_bytes(bytes),
            ))
        }
        .await;

        histogram!("gateway_upstream_duration_seconds", "service" => request.service.clone())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                debug!(
                    request_id = %request.id,
                    service = %request.service,
                    status = result.status.as_u16(),
                    "Upstream responded"
                );
                Ok(result)
            }
            Err(err) => {
                let err = self.map_transport_error(err);
                warn!(
                    request_id = %request.id,
                    service = %request.service,
                    error = %err,
                    "Upstream transport failure"
                );
                Err(err)
            }
        }
    }
}

/// `base_address + "/" + sub_path`, plus the inbound query string when present
pub fn build_url(base_address: &str, sub_path: &str, query: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}",
        base_address.trim_end_matches('/'),
        sub_path.trim_start_matches('/')
    );
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Copy end-to-end headers and attach the credential for protected routes
///
/// The inbound `Authorization` header is always dropped; only an extracted credential
/// is ever sent upstream. `Accept-Encoding` is dropped so bodies come back unencoded
/// and can be normalized.
pub fn outbound_headers(
    inbound: &HeaderMap,
    credential: Option<&Credential>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound.iter() {
        if is_stripped(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(value) = credential.and_then(Credential::to_header_value) {
        headers.insert(header::AUTHORIZATION, value);
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    headers
}

fn is_stripped(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONTENT_LENGTH
        || *name == header::AUTHORIZATION
        || *name == header::ACCEPT_ENCODING
        || HOP_BY_HOP_HEADERS.contains(&name.as_str())
}
