//! Registry module - Service model, durable storage and the registry store

pub mod models;
pub mod storage;
pub mod store;

pub use models::{Instance, Registry, Service};
pub use storage::{JsonFileStorage, MemoryStorage, RegistryStorage};
pub use store::RegistryStore;
