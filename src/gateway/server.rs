//! # HTTP Server Module
//!
//! Inbound surface of the gateway, built on axum:
//!
//! - `{GET,POST,PUT,DELETE,PATCH} /api/{service}/{path...}` -> [`Dispatcher`]
//! - `GET /health`, `GET /ready`
//! - the Prometheus endpoint when a recorder handle is supplied
//!
//! Each inbound request is served by its own task. Handler futures own their outbound
//! call, so when a client disconnects and hyper drops the handler, the in-flight
//! upstream request is dropped with it.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, on, MethodFilter},
    Router as AxumRouter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::core::config::{CorsConfig, GatewayConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::InboundRequest;
use crate::gateway::dispatcher::Dispatcher;
use crate::gateway::forwarder::REQUEST_ID_HEADER;

const API_PREFIX: &str = "/api/";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server wrapping the gateway router
pub struct GatewayServer {
    bind_addr: SocketAddr,
    app: AxumRouter,
}

impl GatewayServer {
    /// Build the server from validated configuration
    pub fn new(config: &GatewayConfig, metrics: Option<PrometheusHandle>) -> GatewayResult<Self> {
        let bind_addr = format!("{}:{}", config.server.bind_address, config.server.http_port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))?;

        let dispatcher = Dispatcher::from_config(config)?;
        let app = build_router(dispatcher, config, metrics);

        Ok(Self { bind_addr, app })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Router for in-process use (tests, embedding)
    pub fn router(&self) -> AxumRouter {
        self.app.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| GatewayError::Io {
                message: format!("Failed to bind gateway server to {}: {}", self.bind_addr, e),
            })?;

        info!("Gateway HTTP server listening on {}", self.bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))
    }
}

/// Assemble the axum router with its layers
pub fn build_router(
    dispatcher: Dispatcher,
    config: &GatewayConfig,
    metrics: Option<PrometheusHandle>,
) -> AxumRouter {
    let state = ServerState {
        dispatcher: Arc::new(dispatcher),
    };

    let api_methods = MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH);

    let mut app = AxumRouter::new()
        .route("/api/*rest", on(api_methods, handle_api_request))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(route_not_found)
        .with_state(state);

    if config.observability.metrics.enabled {
        if let Some(handle) = metrics {
            let path = config.observability.metrics.endpoint_path.clone();
            app = app.route(
                &path,
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
            info!(path = %config.observability.metrics.endpoint_path, "Prometheus metrics enabled");
        }
    }

    app = app
        .layer(DefaultBodyLimit::max(config.server.max_request_size))
        .layer(TraceLayer::new_for_http());

    if config.cors.enabled {
        app = app.layer(cors_layer(&config.cors));
        info!(
            "CORS enabled with {} allowed origins",
            config.cors.allowed_origins.len()
        );
    }

    app
}

/// CORS policy for browser clients
///
/// A wildcard origin cannot be combined with credentials, so credentials are only
/// allowed when origins are listed explicitly.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().max_age(config.max_age);

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return layer
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Split `/api/{service}/{path...}` into service name and raw sub-path
///
/// The sub-path keeps its percent-encoding and trailing slash exactly as received.
pub fn split_api_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(API_PREFIX)?;
    let (service, sub_path) = rest.split_once('/').unwrap_or((rest, ""));
    if service.is_empty() {
        return None;
    }
    Some((service, sub_path))
}

/// Main request handler for the `/api` surface
#[instrument(skip_all, fields(request_id, method = %method, service))]
async fn handle_api_request(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((service, sub_path)) = split_api_path(uri.path()) else {
        return GatewayError::service_not_found("").into_response();
    };

    let mut request = InboundRequest::new(method, service, sub_path, headers, body)
        .with_query(uri.query().map(str::to_string));

    if let Some(id) = inbound_request_id(&request.headers) {
        request = request.with_id(id);
    }

    tracing::Span::current()
        .record("request_id", request.id.as_str())
        .record("service", request.service.as_str());

    state.dispatcher.handle(request).await
}

/// Reuse a caller-supplied request id when it is reasonable
fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
}

async fn route_not_found(uri: Uri) -> GatewayError {
    GatewayError::RouteNotFound {
        path: uri.path().to_string(),
    }
}

/// Gateway health check handler
pub async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "gateway"
    }))
}

/// Gateway readiness check handler
async fn readiness_check(State(state): State<ServerState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "gateway",
        "checks": {
            "services": state.dispatcher.registry().service_names(),
            "public_routes": state.dispatcher.classifier().public_route_count(),
        }
    }))
}
