//! Unit tests for the registry store

use async_trait::async_trait;
use registry_gateway::error::AppError;
use registry_gateway::gateway::LoadBalancingStrategy;
use registry_gateway::registry::{
    Instance, JsonFileStorage, MemoryStorage, Registry, RegistryStorage, RegistryStore,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Storage that can be switched into a failing state
#[derive(Default)]
struct FlakyStorage {
    failing: AtomicBool,
    inner: MemoryStorage,
}

#[async_trait]
impl RegistryStorage for FlakyStorage {
    async fn load(&self) -> registry_gateway::Result<Option<Registry>> {
        self.inner.load().await
    }

    async fn save(&self, registry: &Registry) -> registry_gateway::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.save(registry).await
    }
}

/// Storage that holds its first save until released and records every save
#[derive(Default)]
struct GatedStorage {
    hold_first: AtomicBool,
    release: Notify,
    saved_counts: Mutex<Vec<usize>>,
}

#[async_trait]
impl RegistryStorage for GatedStorage {
    async fn load(&self) -> registry_gateway::Result<Option<Registry>> {
        Ok(None)
    }

    async fn save(&self, registry: &Registry) -> registry_gateway::Result<()> {
        if self.hold_first.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        let count = registry.services["orders"].instances.len();
        self.saved_counts.lock().push(count);
        Ok(())
    }
}

fn orders_store() -> (RegistryStore, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = RegistryStore::new(Registry::with_services(["orders"]), storage.clone());
    (store, storage)
}

fn instance(port: u16) -> Instance {
    Instance::new("http", "10.0.0.1", port)
}

#[tokio::test]
async fn test_register_appends_in_order() {
    let (store, _) = orders_store();
    store.register("orders", instance(9001)).await.unwrap();
    store.register("orders", instance(9002)).await.unwrap();

    let service = store.get_service("orders").unwrap();
    let urls: Vec<&str> = service.instances.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["http://10.0.0.1:9001", "http://10.0.0.1:9002"]);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let (store, _) = orders_store();
    store.register("orders", instance(9001)).await.unwrap();

    let err = store.register("orders", instance(9001)).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyRegistered { ref url, .. } if url == "http://10.0.0.1:9001"));
    assert_eq!(store.get_service("orders").unwrap().instances.len(), 1);
}

#[tokio::test]
async fn test_unregister_then_register_restores_count() {
    let (store, _) = orders_store();
    store.register("orders", instance(9001)).await.unwrap();
    store.register("orders", instance(9002)).await.unwrap();

    store.unregister("orders", "http://10.0.0.1:9001").await.unwrap();
    assert_eq!(store.get_service("orders").unwrap().instances.len(), 1);

    store.register("orders", instance(9001)).await.unwrap();
    let service = store.get_service("orders").unwrap();
    assert_eq!(service.instances.len(), 2);
    // Re-registration appends at the end of the rotation
    assert_eq!(service.instances[1].url, "http://10.0.0.1:9001");
}

#[tokio::test]
async fn test_unregister_unknown_url() {
    let (store, _) = orders_store();
    let err = store
        .unregister("orders", "http://10.0.0.1:9001")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotRegistered { .. }));
}

#[tokio::test]
async fn test_set_enabled_toggles_flag() {
    let (store, storage) = orders_store();
    store.register("orders", instance(9001)).await.unwrap();

    store
        .set_enabled("orders", "http://10.0.0.1:9001", false)
        .await
        .unwrap();
    assert!(!store.get_service("orders").unwrap().instances[0].enabled);
    assert!(!storage.snapshot().unwrap().services["orders"].instances[0].enabled);

    store
        .set_enabled("orders", "http://10.0.0.1:9001", true)
        .await
        .unwrap();
    assert!(store.get_service("orders").unwrap().instances[0].enabled);
}

#[tokio::test]
async fn test_set_enabled_unknown_instance() {
    let (store, _) = orders_store();
    let err = store
        .set_enabled("orders", "http://10.0.0.1:9001", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InstanceNotFound { .. }));
}

#[tokio::test]
async fn test_unknown_service_never_mutates() {
    let (store, storage) = orders_store();
    let before = store.services();

    assert!(matches!(
        store.register("billing", instance(9001)).await,
        Err(AppError::UnknownService(_))
    ));
    assert!(matches!(
        store.unregister("billing", "http://10.0.0.1:9001").await,
        Err(AppError::UnknownService(_))
    ));
    assert!(matches!(
        store.set_enabled("billing", "http://10.0.0.1:9001", true).await,
        Err(AppError::UnknownService(_))
    ));
    assert!(matches!(
        store
            .ensure_strategy("billing", LoadBalancingStrategy::RoundRobin)
            .await,
        Err(AppError::UnknownService(_))
    ));
    assert!(matches!(
        store.get_service("billing"),
        Err(AppError::UnknownService(_))
    ));

    assert_eq!(store.services(), before);
    assert!(storage.snapshot().is_none());
}

#[tokio::test]
async fn test_strategy_assigned_once_and_persisted() {
    let (store, storage) = orders_store();
    assert_eq!(store.get_service("orders").unwrap().strategy, None);

    store
        .ensure_strategy("orders", LoadBalancingStrategy::RoundRobin)
        .await
        .unwrap();
    let effective = store
        .ensure_strategy("orders", LoadBalancingStrategy::WeightedRoundRobin)
        .await
        .unwrap();

    assert_eq!(effective, LoadBalancingStrategy::RoundRobin);
    assert_eq!(
        storage.snapshot().unwrap().services["orders"].strategy,
        Some(LoadBalancingStrategy::RoundRobin)
    );
}

#[tokio::test]
async fn test_persistence_failure_keeps_memory_state() {
    let storage = Arc::new(FlakyStorage::default());
    let store = RegistryStore::new(Registry::with_services(["orders"]), storage.clone());

    storage.failing.store(true, Ordering::SeqCst);
    let err = store.register("orders", instance(9001)).await.unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));

    // The mutation stays in effect for the rest of the process lifetime
    assert_eq!(store.get_service("orders").unwrap().instances.len(), 1);
    assert!(!store.is_persisted().await);
    assert!(storage.inner.snapshot().is_none());

    storage.failing.store(false, Ordering::SeqCst);
    store.flush().await.unwrap();
    assert!(store.is_persisted().await);
    assert_eq!(
        storage.inner.snapshot().unwrap().services["orders"].instances.len(),
        1
    );
}

#[tokio::test]
async fn test_next_successful_persist_carries_earlier_failure() {
    let storage = Arc::new(FlakyStorage::default());
    let store = RegistryStore::new(Registry::with_services(["orders"]), storage.clone());

    storage.failing.store(true, Ordering::SeqCst);
    assert!(store.register("orders", instance(9001)).await.is_err());

    storage.failing.store(false, Ordering::SeqCst);
    store.register("orders", instance(9002)).await.unwrap();

    let saved = storage.inner.snapshot().unwrap();
    assert_eq!(saved.services["orders"].instances.len(), 2);
}

#[tokio::test]
async fn test_load_merges_configured_services() {
    let mut persisted = Registry::with_services(["orders"]);
    persisted
        .services
        .get_mut("orders")
        .unwrap()
        .instances
        .push(instance(9001));
    let storage = Arc::new(MemoryStorage::with_registry(persisted));

    let store = RegistryStore::load(storage, &["orders", "payments"]).await.unwrap();

    assert_eq!(store.get_service("orders").unwrap().instances.len(), 1);
    assert!(store.get_service("payments").unwrap().instances.is_empty());
}

#[tokio::test]
async fn test_file_backed_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");

    {
        let storage = Arc::new(JsonFileStorage::new(&path));
        let store = RegistryStore::load(storage, &["orders"]).await.unwrap();
        store.register("orders", instance(9001)).await.unwrap();
        store.register("orders", instance(9002)).await.unwrap();
        store
            .set_enabled("orders", "http://10.0.0.1:9002", false)
            .await
            .unwrap();
        store
            .ensure_strategy("orders", LoadBalancingStrategy::RoundRobin)
            .await
            .unwrap();
    }

    let storage = Arc::new(JsonFileStorage::new(&path));
    let empty: [&str; 0] = [];
    let reloaded = RegistryStore::load(storage, &empty).await.unwrap();
    let service = reloaded.get_service("orders").unwrap();

    assert_eq!(service.strategy, Some(LoadBalancingStrategy::RoundRobin));
    assert_eq!(service.instances.len(), 2);
    assert!(service.instances[0].enabled);
    assert!(!service.instances[1].enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_are_all_kept() {
    let storage = Arc::new(MemoryStorage::new());
    let store = Arc::new(RegistryStore::new(
        Registry::with_services(["orders"]),
        storage.clone(),
    ));

    let tasks = (0..50u16).map(|i| {
        let store = store.clone();
        tokio::spawn(async move { store.register("orders", instance(9000 + i)).await })
    });

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.get_service("orders").unwrap().instances.len(), 50);
    // The newest snapshot is the one left in storage
    assert_eq!(
        storage.snapshot().unwrap().services["orders"].instances.len(),
        50
    );
    assert!(store.is_persisted().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_agree_on_strategy() {
    let (store, _) = orders_store();
    let store = Arc::new(store);

    let strategies = [
        LoadBalancingStrategy::RoundRobin,
        LoadBalancingStrategy::Random,
        LoadBalancingStrategy::WeightedRoundRobin,
    ];
    let tasks = (0..30).map(|i| {
        let store = store.clone();
        let strategy = strategies[i % strategies.len()];
        tokio::spawn(async move { store.ensure_strategy("orders", strategy).await })
    });

    let results: Vec<LoadBalancingStrategy> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let assigned = store.get_service("orders").unwrap().strategy.unwrap();
    assert!(results.iter().all(|&s| s == assigned));
}

#[tokio::test]
async fn test_flush_never_writes_an_older_registry() {
    let storage = Arc::new(GatedStorage::default());
    storage.hold_first.store(true, Ordering::SeqCst);
    let store = Arc::new(RegistryStore::new(
        Registry::with_services(["orders"]),
        storage.clone(),
    ));
    let settle = || tokio::time::sleep(Duration::from_millis(20));

    // First registration holds the persist lock inside its save
    let first = tokio::spawn({
        let store = store.clone();
        async move { store.register("orders", instance(9001)).await }
    });
    settle().await;

    // Flush queues for the lock, then a second registration queues behind it
    let flush = tokio::spawn({
        let store = store.clone();
        async move { store.flush().await }
    });
    settle().await;
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.register("orders", instance(9002)).await }
    });
    settle().await;

    storage.release.notify_one();
    first.await.unwrap().unwrap();
    flush.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Flush writes the state current when it gets the lock; the second
    // registration then finds its generation already persisted
    assert_eq!(*storage.saved_counts.lock(), vec![1, 2]);
    assert!(store.is_persisted().await);
}
