//! Connector Store (C1), Connector Registry (C2), and Lifecycle Manager
//! (C3): durable connector config persistence, the live-handle index, and
//! the init/shutdown hook chains that gate connector availability.
pub mod lifecycle;
pub mod registry;
pub mod store;
pub mod types;

pub use lifecycle::{
    ConnectorState, HealthCheckHook, LifecycleManager, PostInitHook, PostShutdownHook,
    PreInitHook, PreShutdownHook, ValidationHook,
};
pub use registry::{ConnectorHandle, ConnectorRegistry, ResourceLister, Searchable, SearchFilters, Syncable, WorkContext};
pub use store::{ConnectorStore, InMemoryConnectorStore, SqliteConnectorStore};
pub use types::{
    Connector, ConnectorCapabilities, ConnectorStatus, ConnectorType, RateLimitInfo, SearchHit,
    SyncStatus,
};
