//! Gateway router: resolves a service, picks an instance and forwards to it

use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::forwarder::{ForwardedResponse, Forwarder};
use crate::error::{AppError, Result};
use crate::gateway::load_balancer::{LoadBalancer, LoadBalancingStrategy};
use crate::registry::store::RegistryStore;

/// An inbound request addressed to `/:service/*path`
#[derive(Debug)]
pub struct RoutedRequest<'a> {
    pub service: &'a str,
    pub path: &'a str,
    pub method: Method,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
}

/// Orchestrates registry lookup, instance selection and forwarding
pub struct GatewayRouter {
    registry: Arc<RegistryStore>,
    load_balancer: Arc<LoadBalancer>,
    forwarder: Arc<Forwarder>,
    default_strategy: LoadBalancingStrategy,
}

impl GatewayRouter {
    /// Create a new router
    pub fn new(
        registry: Arc<RegistryStore>,
        load_balancer: Arc<LoadBalancer>,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        Self {
            registry,
            load_balancer,
            forwarder,
            default_strategy: LoadBalancingStrategy::default(),
        }
    }

    /// Route one request end-to-end
    ///
    /// Backend failures are reported, never retried against another instance.
    pub async fn route(&self, request: RoutedRequest<'_>) -> Result<ForwardedResponse> {
        // Fail fast on unknown services before touching strategy state
        self.registry.get_service(request.service)?;

        match self
            .registry
            .ensure_strategy(request.service, self.default_strategy)
            .await
        {
            Ok(_) => {}
            // Assigned in memory; the next successful persist carries it
            Err(AppError::Persistence(reason)) => {
                warn!(
                    service = %request.service,
                    reason = %reason,
                    "Routing with unpersisted strategy"
                );
            }
            Err(e) => return Err(e),
        }

        // Re-read so selection sees the assigned strategy and the latest instances
        let service = self.registry.get_service(request.service)?;
        let index = self
            .load_balancer
            .select_instance(request.service, &service)?;
        let instance = &service.instances[index];

        debug!(
            service = %request.service,
            instance = %instance.url,
            path = %request.path,
            "Routed request"
        );

        self.forwarder
            .forward(
                instance,
                request.method,
                request.path,
                request.query,
                request.headers,
                request.body,
            )
            .await
    }
}
