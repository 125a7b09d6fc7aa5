//! Service Registry Gateway
//!
//! A reverse-proxy gateway that keeps a dynamic registry of backend service
//! instances and forwards each request to one instance picked by a
//! per-service load balancing strategy.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;

pub use error::{AppError, Result};

use std::sync::Arc;

use crate::backend::forwarder::Forwarder;
use crate::config::Settings;
use crate::gateway::{load_balancer::LoadBalancer, router::GatewayRouter};
use crate::registry::store::RegistryStore;

/// Application state shared across all handlers
pub struct AppState {
    pub registry: Arc<RegistryStore>,
    pub gateway: Arc<GatewayRouter>,
}

impl AppState {
    /// Wire the load balancer, forwarder and router around a loaded registry
    pub fn new(settings: &Settings, registry: Arc<RegistryStore>) -> Result<Self> {
        let forwarder = Arc::new(Forwarder::new(&settings.forwarder)?);
        let gateway = Arc::new(GatewayRouter::new(
            registry.clone(),
            Arc::new(LoadBalancer::new()),
            forwarder,
        ));

        Ok(Self { registry, gateway })
    }
}
