//! # Route Classifier
//!
//! Decides whether a `(service, sub-path)` pair may be forwarded without a credential.
//!
//! Matching is exact string membership on `"{service}/{sub_path}"`. There are no
//! wildcards and no prefix matches: every public endpoint is listed explicitly, and
//! anything not listed is protected.

use std::collections::HashSet;

use crate::core::error::{GatewayError, GatewayResult};
use crate::discovery::ServiceRegistry;

/// A `(service, path)` lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutePattern {
    pub service: String,
    pub path: String,
}

impl RoutePattern {
    pub fn new<S: Into<String>>(service: S, path: &str) -> Self {
        Self {
            service: service.into(),
            path: normalize_sub_path(path).to_string(),
        }
    }

    /// Parse the `service/path` form used in configuration
    pub fn parse(route: &str) -> GatewayResult<Self> {
        match route.split_once('/') {
            Some((service, path)) if !service.is_empty() && !path.is_empty() => {
                Ok(Self::new(service, path))
            }
            _ => Err(GatewayError::config(format!(
                "Invalid public route '{}': expected 'service/path'",
                route
            ))),
        }
    }

    /// The exact key used for membership checks
    pub fn key(&self) -> String {
        route_key(&self.service, &self.path)
    }
}

/// Strip leading slashes so `/token` and `token` name the same endpoint
///
/// Trailing slashes are significant: `auth/register/` and `auth/register` differ.
fn normalize_sub_path(sub_path: &str) -> &str {
    sub_path.trim_start_matches('/')
}

fn route_key(service: &str, sub_path: &str) -> String {
    format!("{}/{}", service, normalize_sub_path(sub_path))
}

/// Fixed table of public routes
#[derive(Debug, Clone, Default)]
pub struct RouteClassifier {
    public: HashSet<String>,
}

impl RouteClassifier {
    /// Build a classifier from public patterns
    pub fn new<I>(public_routes: I) -> Self
    where
        I: IntoIterator<Item = RoutePattern>,
    {
        Self {
            public: public_routes.into_iter().map(|p| p.key()).collect(),
        }
    }

    /// Build a classifier, rejecting patterns whose service is not registered
    pub fn with_registry<I>(public_routes: I, registry: &ServiceRegistry) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = RoutePattern>,
    {
        let patterns: Vec<RoutePattern> = public_routes.into_iter().collect();
        if let Some(unknown) = patterns.iter().find(|p| !registry.contains(&p.service)) {
            return Err(GatewayError::config(format!(
                "Public route '{}' references unknown service '{}'",
                unknown.key(),
                unknown.service
            )));
        }
        Ok(Self::new(patterns))
    }

    /// `true` only for explicitly listed pairs
    pub fn is_public(&self, service_name: &str, sub_path: &str) -> bool {
        self.public.contains(&route_key(service_name, sub_path))
    }

    pub fn public_route_count(&self) -> usize {
        self.public.len()
    }
}
