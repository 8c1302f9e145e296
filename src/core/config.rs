//! # Configuration Module
//!
//! Gateway configuration, loaded once at process start and read-only afterwards.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Environment variable override support (`GATEWAY_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once
//! - Defaults that reproduce the launch topology (`auth` and `core` backends)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::routing::classifier::RoutePattern;

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound listener settings
    pub server: ServerConfig,

    /// Outbound connection pool settings
    pub upstream_pool: UpstreamPoolConfig,

    /// Logical service name -> base address
    pub services: BTreeMap<String, String>,

    /// Exact `service/sub-path` keys reachable without a credential
    pub public_routes: Vec<String>,

    /// Cross-origin settings for browser clients
    pub cors: CorsConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    /// Load from `path` when it exists, otherwise start from the built-in defaults
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        if tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            return Self::load_from_file(path).await;
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_yaml_str(content: &str) -> GatewayResult<Self> {
        let mut config: GatewayConfig = serde_yaml::from_str(content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: GATEWAY_<SECTION>_<FIELD>
    /// For example: GATEWAY_SERVER_HTTP_PORT=8000, GATEWAY_SERVICE_CORE_URL=http://core:8000
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e)))?;
        }

        if let Some(size) = lookup("GATEWAY_SERVER_MAX_REQUEST_SIZE") {
            self.server.max_request_size = size.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_MAX_REQUEST_SIZE: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("GATEWAY_SERVER_UPSTREAM_TIMEOUT") {
            self.server.timeouts.upstream_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_UPSTREAM_TIMEOUT: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("GATEWAY_SERVER_CONNECT_TIMEOUT") {
            self.server.timeouts.connect_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_CONNECT_TIMEOUT: {}", e))
            })?;
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = format;
        }

        if let Some(enabled) = lookup("GATEWAY_METRICS_ENABLED") {
            self.observability.metrics.enabled = enabled
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_METRICS_ENABLED: {}", e)))?;
        }

        for (name, address) in self.services.iter_mut() {
            let key = format!(
                "GATEWAY_SERVICE_{}_URL",
                name.to_uppercase().replace('-', "_")
            );
            if let Some(url) = lookup(&key) {
                *address = url;
            }
        }

        Ok(())
    }

    /// Parse the configured public routes into lookup patterns
    pub fn public_route_patterns(&self) -> GatewayResult<Vec<RoutePattern>> {
        self.public_routes
            .iter()
            .map(|route| RoutePattern::parse(route))
            .collect()
    }

    /// Comprehensive configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.http_port == 0 {
            errors.push("http_port must be greater than 0".to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.timeouts.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        if self.server.timeouts.connect_timeout.is_zero() {
            errors.push("connect_timeout must be greater than 0".to_string());
        }

        if self.services.is_empty() {
            errors.push("At least one service must be configured".to_string());
        }

        for (name, address) in &self.services {
            if name.is_empty() || name.contains('/') {
                errors.push(format!("Invalid service name '{}'", name));
            }
            match Url::parse(address) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(format!(
                    "Service '{}' has unsupported scheme '{}'",
                    name,
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Service '{}' has invalid address: {}", name, e)),
            }
        }

        for route in &self.public_routes {
            match RoutePattern::parse(route) {
                Ok(pattern) if !self.services.contains_key(&pattern.service) => errors.push(format!(
                    "Public route '{}' references unknown service '{}'",
                    route, pattern.service
                )),
                Ok(_) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!(
                "Invalid log level: {}",
                self.observability.logging.level
            )),
        }

        match self.observability.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!(
                "Invalid log format: {}",
                self.observability.logging.format
            )),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert("auth".to_string(), "http://auth_service:8000".to_string());
        services.insert("core".to_string(), "http://core_service:8000".to_string());

        Self {
            server: ServerConfig::default(),
            upstream_pool: UpstreamPoolConfig::default(),
            services,
            public_routes: vec![
                "auth/token".to_string(),
                "auth/register/".to_string(),
                "core/apply/".to_string(),
            ],
            cors: CorsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    pub http_port: u16,

    /// Maximum inbound request body size in bytes
    pub max_request_size: usize,

    pub timeouts: TimeoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8000,
            max_request_size: 16 * 1024 * 1024, // 16MB
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on a whole upstream exchange
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Upper bound on establishing an upstream connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared outbound client pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamPoolConfig {
    /// Idle keep-alive connections kept per backend host
    pub max_idle_per_host: usize,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Duration,
}

impl Default for UpstreamPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(30),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Allowed origins (use "*" for any origin)
    pub allowed_origins: Vec<String>,

    /// Max age for preflight requests
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: Duration::from_secs(3600),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose a Prometheus endpoint
    pub enabled: bool,

    pub endpoint_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint_path: "/metrics".to_string(),
        }
    }
}
