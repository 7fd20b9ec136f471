use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info, warn};

use crate::config::LifecycleConfig;
use crate::connectors::registry::ConnectorRegistry;
use crate::connectors::store::ConnectorStore;
use crate::connectors::types::Connector;
use crate::error::HookPhase;
use crate::{ConexusError, ConnectorHandle, Result};

/// Per-connector lifecycle state (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Unregistered,
    Initializing,
    Active,
    Draining,
}

#[async_trait]
pub trait PreInitHook: Send + Sync {
    async fn run(&self, connector: &Connector) -> Result<()>;
}

#[async_trait]
pub trait PostInitHook: Send + Sync {
    async fn run(&self, connector: &Connector, handle: &Arc<dyn ConnectorHandle>) -> Result<()>;
}

#[async_trait]
pub trait PreShutdownHook: Send + Sync {
    async fn run(&self, connector: &Connector, handle: &Arc<dyn ConnectorHandle>) -> Result<()>;
}

#[async_trait]
pub trait PostShutdownHook: Send + Sync {
    async fn run(&self, connector: &Connector) -> Result<()>;
}

/// Built-in `HealthCheck` hook (spec §4.3): pre-init validates non-empty
/// id/type; post-init requires a liveness acknowledgement (probed via the
/// handle's rate-limit call, the only base-contract call guaranteed cheap)
/// before the configured timeout; shutdown side is a no-op.
pub struct HealthCheckHook {
    timeout: Duration,
}

impl HealthCheckHook {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PreInitHook for HealthCheckHook {
    async fn run(&self, connector: &Connector) -> Result<()> {
        if connector.id.trim().is_empty() {
            return Err(ConexusError::InvalidConfig(
                "health check: connector id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PostInitHook for HealthCheckHook {
    async fn run(&self, _connector: &Connector, handle: &Arc<dyn ConnectorHandle>) -> Result<()> {
        tokio::time::timeout(self.timeout, handle.rate_limit())
            .await
            .map_err(|_| {
                ConexusError::Timeout {
                    message: "health check liveness acknowledgement timed out".to_string(),
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl PreShutdownHook for HealthCheckHook {
    async fn run(&self, _connector: &Connector, _handle: &Arc<dyn ConnectorHandle>) -> Result<()> {
        Ok(())
    }
}

/// Built-in `Validation` hook (spec §4.3): pre-init verifies all
/// caller-listed required config keys are present in the connector's
/// config map.
pub struct ValidationHook {
    required_keys: Vec<String>,
}

impl ValidationHook {
    pub fn new(required_keys: Vec<String>) -> Self {
        Self { required_keys }
    }
}

#[async_trait]
impl PreInitHook for ValidationHook {
    async fn run(&self, connector: &Connector) -> Result<()> {
        for key in &self.required_keys {
            if !connector.config.contains_key(key) {
                return Err(ConexusError::InvalidConfig(format!(
                    "missing required config key: {key}"
                )));
            }
        }
        Ok(())
    }
}

/// Initializes/shuts down connectors with ordered hook chains and rollback
/// (C3, spec §4.3). One Initialize/Shutdown per connector is expected in
/// flight at a time; `shutdown_all` fans out under a once-latch so repeat
/// calls are no-ops.
pub struct LifecycleManager {
    store: Arc<dyn ConnectorStore>,
    registry: Arc<ConnectorRegistry>,
    pre_init_hooks: RwLock<Vec<Arc<dyn PreInitHook>>>,
    post_init_hooks: RwLock<Vec<Arc<dyn PostInitHook>>>,
    pre_shutdown_hooks: RwLock<Vec<Arc<dyn PreShutdownHook>>>,
    post_shutdown_hooks: RwLock<Vec<Arc<dyn PostShutdownHook>>>,
    states: RwLock<HashMap<String, ConnectorState>>,
    shutdown_all_latch: OnceCell<Vec<String>>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn ConnectorStore>,
        registry: Arc<ConnectorRegistry>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            registry,
            pre_init_hooks: RwLock::new(Vec::new()),
            post_init_hooks: RwLock::new(Vec::new()),
            pre_shutdown_hooks: RwLock::new(Vec::new()),
            post_shutdown_hooks: RwLock::new(Vec::new()),
            states: RwLock::new(HashMap::new()),
            shutdown_all_latch: OnceCell::new(),
            config,
        }
    }

    pub async fn register_pre_init_hook(&self, hook: Arc<dyn PreInitHook>) {
        self.pre_init_hooks.write().await.push(hook);
    }

    pub async fn register_post_init_hook(&self, hook: Arc<dyn PostInitHook>) {
        self.post_init_hooks.write().await.push(hook);
    }

    pub async fn register_pre_shutdown_hook(&self, hook: Arc<dyn PreShutdownHook>) {
        self.pre_shutdown_hooks.write().await.push(hook);
    }

    pub async fn register_post_shutdown_hook(&self, hook: Arc<dyn PostShutdownHook>) {
        self.post_shutdown_hooks.write().await.push(hook);
    }

    pub async fn state(&self, id: &str) -> ConnectorState {
        self.states
            .read()
            .await
            .get(id)
            .copied()
            .unwrap_or(ConnectorState::Unregistered)
    }

    /// Runs the full Initialize sequence (spec §4.3): pre-init hooks, store
    /// insert, post-init hooks (with rollback on failure), then publish.
    pub async fn initialize(
        &self,
        connector: Connector,
        handle: Arc<dyn ConnectorHandle>,
    ) -> Result<()> {
        let id = connector.id.clone();
        self.states
            .write()
            .await
            .insert(id.clone(), ConnectorState::Initializing);

        // Copy-on-read: hooks are cloned out from under the lock before
        // invocation, so the hook registry is never held locked during I/O.
        let pre_init: Vec<_> = self.pre_init_hooks.read().await.clone();
        for hook in &pre_init {
            if let Err(e) = hook.run(&connector).await {
                self.states
                    .write()
                    .await
                    .insert(id.clone(), ConnectorState::Unregistered);
                return Err(e);
            }
        }

        if let Err(e) = self.store.add(connector.clone()).await {
            self.states
                .write()
                .await
                .insert(id.clone(), ConnectorState::Unregistered);
            return Err(e);
        }

        let post_init: Vec<_> = self.post_init_hooks.read().await.clone();
        for hook in &post_init {
            if let Err(e) = hook.run(&connector, &handle).await {
                if let Err(rollback_err) = self.store.remove(&id).await {
                    warn!(
                        connector_id = %id,
                        error = %rollback_err,
                        "best-effort rollback of store insert failed"
                    );
                }
                self.states
                    .write()
                    .await
                    .insert(id.clone(), ConnectorState::Unregistered);
                return Err(ConexusError::HookFailure {
                    phase: HookPhase::PostInit,
                    causes: vec![e.to_string()],
                });
            }
        }

        self.registry.register(handle).await?;
        self.states
            .write()
            .await
            .insert(id, ConnectorState::Active);
        Ok(())
    }

    /// Runs the full Shutdown sequence (spec §4.3): pre-shutdown hooks,
    /// store removal, then best-effort post-shutdown hooks (all run even
    /// if some fail, errors aggregated).
    pub async fn shutdown(&self, id: &str) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| ConexusError::NotFound(format!("connector {id} not found")))?;
        let connector = self.store.get(id).await?;

        let pre_shutdown: Vec<_> = self.pre_shutdown_hooks.read().await.clone();
        for hook in &pre_shutdown {
            hook.run(&connector, &handle).await?;
        }

        self.store.remove(id).await?;

        let post_shutdown: Vec<_> = self.post_shutdown_hooks.read().await.clone();
        let mut causes = Vec::new();
        for hook in &post_shutdown {
            if let Err(e) = hook.run(&connector).await {
                error!(connector_id = %id, error = %e, "post-shutdown hook failed");
                causes.push(e.to_string());
            }
        }

        self.registry.unregister(id).await;
        self.states
            .write()
            .await
            .insert(id.to_string(), ConnectorState::Unregistered);

        if !causes.is_empty() {
            return Err(ConexusError::HookFailure {
                phase: HookPhase::PostShutdown,
                causes,
            });
        }
        Ok(())
    }

    /// Idempotent: drains all connectors in parallel, each under `deadline`
    /// (default from config). Subsequent calls after the first are no-ops,
    /// expressed as a latch rather than a mutable flag (spec §9).
    pub async fn shutdown_all(&self, deadline: Option<Duration>) -> Result<()> {
        let deadline = deadline.unwrap_or_else(|| self.config.shutdown_all_deadline());

        let causes = self
            .shutdown_all_latch
            .get_or_init(|| async {
                let ids = self.registry.all_ids().await;
                let mut causes = Vec::new();
                for id in ids {
                    match tokio::time::timeout(deadline, self.shutdown(&id)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => causes.push(format!("{id}: {e}")),
                        Err(_) => causes.push(format!("{id}: shutdown deadline exceeded")),
                    }
                }
                if !causes.is_empty() {
                    warn!(errors = ?causes, "shutdown_all completed with per-connector errors");
                } else {
                    info!("shutdown_all complete, registry drained");
                }
                causes
            })
            .await;

        if causes.is_empty() {
            Ok(())
        } else {
            Err(ConexusError::HookFailure {
                phase: HookPhase::PostShutdown,
                causes: causes.clone(),
            })
        }
    }
}
