//! # Gateway Dispatcher
//!
//! Top-level handling of one inbound request. Each request moves through
//!
//! ```text
//! RESOLVING -> CLASSIFYING -> (AUTHENTICATING) -> FORWARDING -> RESPONDING
//! ```
//!
//! and can fail at any stage. Classification always happens before credential
//! checks, and a protected request without a credential never reaches the upstream.
//! Every failure is turned into a client response here; nothing escapes a single
//! request's handling.
//!
//! The dispatcher holds only read-only tables and the shared upstream client, so one
//! instance serves any number of concurrent requests.

use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::credentials;
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{ForwardResult, InboundRequest};
use crate::discovery::ServiceRegistry;
use crate::gateway::forwarder::{Forwarder, Upstream, REQUEST_ID_HEADER};
use crate::routing::RouteClassifier;

/// Processing stage of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Resolving,
    Classifying,
    Authenticating,
    Forwarding,
    Responding,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Classifying => "classifying",
            Self::Authenticating => "authenticating",
            Self::Forwarding => "forwarding",
            Self::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Gateway-origin failure together with the stage it happened in
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub stage: DispatchStage,
    pub error: GatewayError,
}

impl DispatchFailure {
    fn at(stage: DispatchStage, error: GatewayError) -> Self {
        Self { stage, error }
    }
}

/// Routes, gates and forwards requests
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    classifier: Arc<RouteClassifier>,
    upstream: Arc<dyn Upstream>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        classifier: Arc<RouteClassifier>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            registry,
            classifier,
            upstream,
        }
    }

    /// Build registry, classifier and the pooled forwarder from configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let registry = ServiceRegistry::from_config(config)?;
        let classifier =
            RouteClassifier::with_registry(config.public_route_patterns()?, &registry)?;
        let forwarder = Forwarder::from_config(config)?;

        info!(
            services = ?registry.service_names(),
            public_routes = classifier.public_route_count(),
            "Dispatcher initialized"
        );

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(classifier),
            Arc::new(forwarder),
        ))
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Run the request through every stage, stopping at the first failure
    pub async fn dispatch(
        &self,
        request: &InboundRequest,
    ) -> Result<ForwardResult, DispatchFailure> {
        let base_address = self
            .registry
            .resolve(&request.service)
            .map_err(|e| DispatchFailure::at(DispatchStage::Resolving, e))?;

        let is_public = self.classifier.is_public(&request.service, &request.sub_path);
        debug!(
            request_id = %request.id,
            stage = %DispatchStage::Classifying,
            public = is_public,
            "Route classified"
        );

        let credential = if is_public {
            None
        } else {
            let credential = credentials::extract(&request.headers).map_err(|missing| {
                DispatchFailure::at(
                    DispatchStage::Authenticating,
                    GatewayError::unauthenticated(missing.to_string()),
                )
            })?;
            Some(credential)
        };

        self.upstream
            .forward(base_address, request, credential.as_ref())
            .await
            .map_err(|e| {
                DispatchFailure::at(
                    DispatchStage::Forwarding,
                    e.into_gateway_error(&request.service),
                )
            })
    }

    /// Dispatch and build the client response
    ///
    /// Backend responses, including backend error statuses, are emitted verbatim.
    pub async fn handle(&self, request: InboundRequest) -> Response {
        let service_label = if self.registry.contains(&request.service) {
            request.service.clone()
        } else {
            "unknown".to_string()
        };

        let mut response = match self.dispatch(&request).await {
            Ok(result) => {
                debug!(
                    request_id = %request.id,
                    stage = %DispatchStage::Responding,
                    status = result.status.as_u16(),
                    elapsed_ms = request.received_at.elapsed().as_millis() as u64,
                    "Returning upstream response"
                );
                counter!(
                    "gateway_requests_total",
                    "service" => service_label,
                    "outcome" => "forwarded"
                )
                .increment(1);
                result.into_response()
            }
            Err(failure) => {
                warn!(
                    request_id = %request.id,
                    stage = %failure.stage,
                    status = failure.error.status_code().as_u16(),
                    error = %failure.error,
                    "Request failed at gateway"
                );
                counter!(
                    "gateway_requests_total",
                    "service" => service_label,
                    "outcome" => failure.error.error_type()
                )
                .increment(1);
                failure.error.into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request.id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }
}
