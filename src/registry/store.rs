//! Registry store: the single owner of the service → instances table

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::gateway::load_balancer::LoadBalancingStrategy;
use crate::registry::models::{Instance, Registry, Service};
use crate::registry::storage::{persistence_error, RegistryStorage};

/// In-memory registry plus a generation number bumped on every mutation
struct State {
    registry: Registry,
    generation: u64,
}

impl State {
    fn commit(&mut self) -> Snapshot {
        self.generation += 1;
        Snapshot {
            registry: self.registry.clone(),
            generation: self.generation,
        }
    }
}

/// Registry copy taken under the write lock, to be persisted outside it
struct Snapshot {
    registry: Registry,
    generation: u64,
}

/// Registry store
///
/// Mutations are applied under a write lock that is never held across an
/// `.await`. Persistence runs afterwards, serialized through an async mutex
/// that remembers the last persisted generation so a slow writer can never
/// replace a newer durable copy with an older one.
pub struct RegistryStore {
    state: RwLock<State>,
    storage: Arc<dyn RegistryStorage>,
    persisted: Mutex<u64>,
}

impl RegistryStore {
    /// Create a store from an already loaded registry
    pub fn new(registry: Registry, storage: Arc<dyn RegistryStorage>) -> Self {
        Self {
            state: RwLock::new(State {
                registry,
                generation: 0,
            }),
            storage,
            persisted: Mutex::new(0),
        }
    }

    /// Load the durable registry and declare the configured service names
    pub async fn load<S: AsRef<str>>(
        storage: Arc<dyn RegistryStorage>,
        services: &[S],
    ) -> Result<Self> {
        let mut registry = storage.load().await?.unwrap_or_default();
        registry.declare_services(services.iter().map(|s| s.as_ref().to_string()));

        info!(
            services = registry.services.len(),
            instances = registry
                .services
                .values()
                .map(|s| s.instances.len())
                .sum::<usize>(),
            "Loaded service registry"
        );

        Ok(Self::new(registry, storage))
    }

    /// Add an instance to a service
    pub async fn register(&self, service: &str, instance: Instance) -> Result<()> {
        let url = instance.url.clone();
        let snapshot = self.modify(service, |entry| {
            if entry.find(&instance.url).is_some() {
                return Err(AppError::AlreadyRegistered {
                    service: service.to_string(),
                    url: instance.url.clone(),
                });
            }
            entry.instances.push(instance);
            Ok(())
        })?;

        info!(service = %service, url = %url, "Registered instance");
        self.persist(snapshot).await
    }

    /// Remove an instance from a service
    pub async fn unregister(&self, service: &str, url: &str) -> Result<()> {
        let snapshot = self.modify(service, |entry| {
            let index = entry.find(url).ok_or_else(|| AppError::NotRegistered {
                service: service.to_string(),
                url: url.to_string(),
            })?;
            entry.instances.remove(index);
            Ok(())
        })?;

        info!(service = %service, url = %url, "Unregistered instance");
        self.persist(snapshot).await
    }

    /// Enable or disable an instance for routing
    pub async fn set_enabled(&self, service: &str, url: &str, enabled: bool) -> Result<()> {
        let snapshot = self.modify(service, |entry| {
            let index = entry.find(url).ok_or_else(|| AppError::InstanceNotFound {
                service: service.to_string(),
                url: url.to_string(),
            })?;
            entry.instances[index].enabled = enabled;
            Ok(())
        })?;

        info!(service = %service, url = %url, enabled, "Updated instance availability");
        self.persist(snapshot).await
    }

    /// Snapshot of a single service
    pub fn get_service(&self, service: &str) -> Result<Service> {
        self.state
            .read()
            .registry
            .services
            .get(service)
            .cloned()
            .ok_or_else(|| AppError::UnknownService(service.to_string()))
    }

    /// Snapshot of the whole registry
    pub fn services(&self) -> Registry {
        self.state.read().registry.clone()
    }

    /// Assign `default` as the service's strategy if it has none yet
    ///
    /// Returns the strategy in effect. Once set, a strategy is never changed.
    pub async fn ensure_strategy(
        &self,
        service: &str,
        default: LoadBalancingStrategy,
    ) -> Result<LoadBalancingStrategy> {
        if let Some(strategy) = self.get_service(service)?.strategy {
            return Ok(strategy);
        }

        let snapshot = {
            let mut state = self.state.write();
            let entry = state
                .registry
                .services
                .get_mut(service)
                .ok_or_else(|| AppError::UnknownService(service.to_string()))?;

            // Another request may have assigned it since the read above
            if let Some(strategy) = entry.strategy {
                return Ok(strategy);
            }
            entry.strategy = Some(default);
            state.commit()
        };

        info!(service = %service, strategy = ?default, "Assigned load balancing strategy");
        self.persist(snapshot).await?;
        Ok(default)
    }

    /// Write the current in-memory registry to storage
    ///
    /// Used to retry after a failed persist and on shutdown.
    pub async fn flush(&self) -> Result<()> {
        // Snapshot under the persist lock so no newer generation can be saved first
        let mut persisted = self.persisted.lock().await;
        let snapshot = {
            let state = self.state.read();
            Snapshot {
                registry: state.registry.clone(),
                generation: state.generation,
            }
        };

        self.storage
            .save(&snapshot.registry)
            .await
            .map_err(persistence_error)?;
        *persisted = snapshot.generation;

        debug!(generation = snapshot.generation, "Flushed registry");
        Ok(())
    }

    /// Whether every in-memory mutation has reached durable storage
    pub async fn is_persisted(&self) -> bool {
        let generation = self.state.read().generation;
        *self.persisted.lock().await >= generation
    }

    /// Apply `f` to one service under the write lock
    ///
    /// `f` must validate before mutating: an error leaves the registry untouched.
    fn modify(
        &self,
        service: &str,
        f: impl FnOnce(&mut Service) -> Result<()>,
    ) -> Result<Snapshot> {
        let mut state = self.state.write();
        let entry = state
            .registry
            .services
            .get_mut(service)
            .ok_or_else(|| AppError::UnknownService(service.to_string()))?;
        f(entry)?;
        Ok(state.commit())
    }

    async fn persist(&self, snapshot: Snapshot) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= snapshot.generation {
            debug!(
                generation = snapshot.generation,
                persisted = *persisted,
                "Newer registry already persisted"
            );
            return Ok(());
        }

        match self.storage.save(&snapshot.registry).await {
            Ok(()) => {
                *persisted = snapshot.generation;
                Ok(())
            }
            Err(e) => {
                error!(
                    generation = snapshot.generation,
                    error = %e,
                    "Failed to persist registry; in-memory state remains authoritative"
                );
                Err(persistence_error(e))
            }
        }
    }
}
