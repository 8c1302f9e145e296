//! # Service Registry
//!
//! Static mapping from a logical service name to a backend base address. Built once
//! from configuration at startup and never mutated afterwards, so it is shared between
//! request tasks behind an `Arc` without any locking.

use std::collections::HashMap;
use url::Url;

use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// A registered backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,

    /// Base address without a trailing slash, e.g. `http://core_service:8000`
    pub base_address: String,
}

impl ServiceEntry {
    /// Validate and normalize a service entry
    pub fn new<N: Into<String>>(name: N, base_address: &str) -> GatewayResult<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(GatewayError::config(format!("Invalid service name '{}'", name)));
        }

        let url = Url::parse(base_address).map_err(|e| {
            GatewayError::config(format!("Service '{}' has invalid address: {}", name, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GatewayError::config(format!(
                "Service '{}' has unsupported scheme '{}'",
                name,
                url.scheme()
            )));
        }

        Ok(Self {
            name,
            base_address: base_address.trim_end_matches('/').to_string(),
        })
    }
}

/// Read-only registry of backend services
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting duplicate names
    pub fn new<I>(entries: I) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = ServiceEntry>,
    {
        let mut map = HashMap::new();
        for entry in entries {
            if map.contains_key(&entry.name) {
                return Err(GatewayError::config(format!(
                    "Duplicate service name '{}'",
                    entry.name
                )));
            }
            map.insert(entry.name.clone(), entry);
        }
        Ok(Self { entries: map })
    }

    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let entries = config
            .services
            .iter()
            .map(|(name, address)| ServiceEntry::new(name.clone(), address))
            .collect::<GatewayResult<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Look up the base address of a logical service
    pub fn resolve(&self, service_name: &str) -> GatewayResult<&str> {
        self.entries
            .get(service_name)
            .map(|entry| entry.base_address.as_str())
            .ok_or_else(|| GatewayError::service_not_found(service_name))
    }

    pub fn contains(&self, service_name: &str) -> bool {
        self.entries.contains_key(service_name)
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
