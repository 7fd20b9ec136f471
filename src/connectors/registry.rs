use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connectors::types::{ConnectorCapabilities, ConnectorType, RateLimitInfo, SearchHit, SyncStatus};
use crate::{ConexusError, Result};

/// Optional work context accompanying a search request (spec §6.1).
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
    pub active_file: Option<String>,
    pub git_branch: Option<String>,
    pub open_ticket_ids: Vec<String>,
}

/// Optional filters accompanying a search request (spec §6.1).
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source_types: Vec<String>,
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
}

/// The mandatory base contract every connector handle implements
/// (spec §6.2). Optional capabilities (`Searchable`, `Syncable`,
/// `ResourceLister`) are probed at runtime via the `as_searchable` /
/// `as_syncable` / `as_resource_lister` downcast hooks.
#[async_trait]
pub trait ConnectorHandle: Send + Sync {
    fn id(&self) -> &str;
    fn connector_type(&self) -> ConnectorType;
    async fn rate_limit(&self) -> RateLimitInfo;
    async fn sync_status(&self) -> SyncStatus;

    /// Returns `self` as a `Searchable` if this handle supports search.
    fn as_searchable(self: Arc<Self>) -> Option<Arc<dyn Searchable>> {
        None
    }

    /// Returns `self` as a `Syncable` if this handle supports sync.
    fn as_syncable(self: Arc<Self>) -> Option<Arc<dyn Syncable>> {
        None
    }

    /// Returns `self` as a `ResourceLister` if this handle supports it.
    fn as_resource_lister(self: Arc<Self>) -> Option<Arc<dyn ResourceLister>> {
        None
    }
}

/// Optional capability: connector can answer search queries (spec §6.2).
#[async_trait]
pub trait Searchable: Send + Sync {
    async fn search(
        &self,
        query: &str,
        work_context: &WorkContext,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>>;
}

/// Optional capability: connector can sync external entities (spec §6.2).
#[async_trait]
pub trait Syncable: Send + Sync {
    async fn sync(&self) -> Result<Vec<String>>;
}

/// Optional capability: connector can list its resources (spec §6.2).
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<String>>;
}

fn probe_capabilities(handle: &Arc<dyn ConnectorHandle>) -> ConnectorCapabilities {
    ConnectorCapabilities {
        supports_search: handle.clone().as_searchable().is_some(),
        supports_sync: handle.clone().as_syncable().is_some(),
        supports_resource_listing: handle.clone().as_resource_lister().is_some(),
        has_rate_limit: true,
    }
}

/// In-memory index of live connector handles keyed by id (C2).
///
/// Does not own lifecycle: populated by the Lifecycle Manager (C3) after a
/// successful init, cleared on shutdown (spec §4.2).
#[derive(Default)]
pub struct ConnectorRegistry {
    handles: RwLock<HashMap<String, Arc<dyn ConnectorHandle>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects handles that do not expose the mandatory base contract.
    /// In this typed implementation every `ConnectorHandle` satisfies the
    /// base contract by construction; this validates a non-empty id only.
    pub fn validate(handle: &Arc<dyn ConnectorHandle>) -> Result<()> {
        if handle.id().trim().is_empty() {
            return Err(ConexusError::InvalidConnector(
                "handle id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn register(&self, handle: Arc<dyn ConnectorHandle>) -> Result<()> {
        Self::validate(&handle)?;
        let id = handle.id().to_string();
        debug!(connector_id = %id, "registering connector handle");
        self.handles.write().await.insert(id, handle);
        Ok(())
    }

    pub async fn unregister(&self, id: &str) -> Option<Arc<dyn ConnectorHandle>> {
        let removed = self.handles.write().await.remove(id);
        if removed.is_none() {
            warn!(connector_id = %id, "unregister called for unknown connector");
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ConnectorHandle>> {
        self.handles.read().await.get(id).cloned()
    }

    pub async fn clear(&self) {
        self.handles.write().await.clear();
    }

    pub async fn all_ids(&self) -> Vec<String> {
        self.handles.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns every registered connector whose handle is `Searchable` and
    /// whose type passes the caller's source-type filter (spec §4.4 step 1).
    pub async fn searchable_connectors(
        &self,
        type_filter: &[String],
    ) -> Vec<Arc<dyn Searchable>> {
        self.searchable_with_ids(type_filter)
            .await
            .into_iter()
            .map(|(_, _, s)| s)
            .collect()
    }

    /// Same as [`Self::searchable_connectors`] but keeps each handle's id
    /// and type alongside, for per-connector outcome reporting (spec §4.4
    /// step 5).
    pub async fn searchable_with_ids(
        &self,
        type_filter: &[String],
    ) -> Vec<(String, ConnectorType, Arc<dyn Searchable>)> {
        let handles = self.handles.read().await;
        handles
            .values()
            .filter(|h| {
                type_filter.is_empty()
                    || type_filter
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&h.connector_type().to_string()))
            })
            .filter_map(|h| {
                let id = h.id().to_string();
                let ty = h.connector_type();
                h.clone().as_searchable().map(|s| (id, ty, s))
            })
            .collect()
    }

    pub async fn capabilities(&self, id: &str) -> Option<ConnectorCapabilities> {
        let handles = self.handles.read().await;
        handles.get(id).map(probe_capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubHandle {
        id: String,
        connector_type: ConnectorType,
        searchable: bool,
    }

    #[async_trait]
    impl ConnectorHandle for StubHandle {
        fn id(&self) -> &str {
            &self.id
        }

        fn connector_type(&self) -> ConnectorType {
            self.connector_type
        }

        async fn rate_limit(&self) -> RateLimitInfo {
            RateLimitInfo {
                remaining: 100,
                reset: chrono::Utc::now(),
                limit: Some(100),
            }
        }

        async fn sync_status(&self) -> SyncStatus {
            SyncStatus {
                last_sync: None,
                in_progress: false,
                error: None,
                rate_limit: None,
            }
        }

        fn as_searchable(self: Arc<Self>) -> Option<Arc<dyn Searchable>> {
            if self.searchable {
                Some(self as Arc<dyn Searchable>)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl Searchable for StubHandle {
        async fn search(
            &self,
            _query: &str,
            _work_context: &WorkContext,
            _filters: &SearchFilters,
        ) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn register_and_get_round_trips() {
        let registry = ConnectorRegistry::new();
        let handle: Arc<dyn ConnectorHandle> = Arc::new(StubHandle {
            id: "c1".to_string(),
            connector_type: ConnectorType::Filesystem,
            searchable: true,
        });
        registry.register(handle).await.unwrap();
        assert!(registry.get("c1").await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unregister_removes_handle() {
        let registry = ConnectorRegistry::new();
        let handle: Arc<dyn ConnectorHandle> = Arc::new(StubHandle {
            id: "c1".to_string(),
            connector_type: ConnectorType::Filesystem,
            searchable: false,
        });
        registry.register(handle).await.unwrap();
        registry.unregister("c1").await;
        assert!(registry.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn searchable_connectors_filters_by_type() {
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(StubHandle {
                id: "fs".to_string(),
                connector_type: ConnectorType::Filesystem,
                searchable: true,
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubHandle {
                id: "gh".to_string(),
                connector_type: ConnectorType::Github,
                searchable: true,
            }))
            .await
            .unwrap();

        let filtered = registry
            .searchable_connectors(&["filesystem".to_string()])
            .await;
        assert_eq!(filtered.len(), 1);

        let unfiltered = registry.searchable_connectors(&[]).await;
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn clear_empties_the_registry() {
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(StubHandle {
                id: "c1".to_string(),
                connector_type: ConnectorType::Filesystem,
                searchable: false,
            }))
            .await
            .unwrap();
        registry.clear().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn register_rejects_empty_id() {
        let registry = ConnectorRegistry::new();
        let handle: Arc<dyn ConnectorHandle> = Arc::new(StubHandle {
            id: "".to_string(),
            connector_type: ConnectorType::Filesystem,
            searchable: false,
        });
        assert!(registry.register(handle).await.is_err());
    }
}
