//! # Intake Gateway Library
//!
//! API gateway in front of the job-application intake services. Requests arrive on
//! `/api/{service}/{path...}`, are matched to a backend by logical service name,
//! gated by a fixed public/protected route table, and forwarded over a shared
//! connection pool. Backend responses are returned unchanged.
//!
//! ## Request flow
//!
//! ```text
//! inbound request -> Dispatcher -> ServiceRegistry -> RouteClassifier
//!                 -> (credential extraction) -> Forwarder -> client response
//! ```

/// Error types, configuration and request/response values
pub mod core;

/// Dispatcher, forwarder and the axum server surface
pub mod gateway;

/// Bearer credential extraction
pub mod auth;

/// Service registry
pub mod discovery;

/// Public/protected route classification
pub mod routing;

/// Logging and metrics setup
pub mod observability;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use core::types::{Credential, ForwardBody, ForwardResult, InboundRequest};
pub use discovery::{ServiceEntry, ServiceRegistry};
pub use gateway::{Dispatcher, Forwarder, GatewayServer};
pub use routing::{RouteClassifier, RoutePattern};
