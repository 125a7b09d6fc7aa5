//! Service and instance data model, shared by the store and its durable form

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::gateway::load_balancer::LoadBalancingStrategy;

/// One concrete backend endpoint of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// `protocol://host:port`, the identity of the instance within its service
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Relative share of traffic under weighted round-robin
    #[serde(default = "default_weight", deserialize_with = "deserialize_weight")]
    pub weight: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

fn deserialize_weight<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(u32::deserialize(deserializer)?.max(1))
}

impl Instance {
    /// Create an enabled instance with the url derived from its parts
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let protocol = protocol.into();
        let host = host.into();
        let url = Self::derive_url(&protocol, &host, port);

        Self {
            protocol,
            host,
            port,
            url,
            enabled: true,
            weight: default_weight(),
        }
    }

    /// Set the weighted round-robin weight, clamped to at least 1
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn derive_url(protocol: &str, host: &str, port: u16) -> String {
        format!("{}://{}:{}", protocol, host, port)
    }
}

/// A named logical backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Unset until the first routed request assigns one
    #[serde(default, rename = "loadBalanceStrategy", skip_serializing_if = "Option::is_none")]
    pub strategy: Option<LoadBalancingStrategy>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Service {
    pub fn find(&self, url: &str) -> Option<usize> {
        self.instances.iter().position(|instance| instance.url == url)
    }
}

/// The whole routing table, keyed by service name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

impl Registry {
    /// Build an empty registry that knows the given service names
    pub fn with_services<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        registry.declare_services(names);
        registry
    }

    /// Add service names that are not yet present, leaving existing ones untouched
    pub fn declare_services<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.services.entry(name.into()).or_default();
        }
    }
}
