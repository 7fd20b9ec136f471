use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::connectors::types::{Connector, ConnectorStatus, ConnectorType};
use crate::{ConexusError, Result};

/// Durable persistence of connector configs (C1), spec §4.1 / §6.3.
///
/// `Add` fails if the id already exists (no upsert); `Update` preserves
/// `created_at`; `List` returns entries newest-first by `created_at`.
#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn add(&self, connector: Connector) -> Result<()>;
    async fn update(&self, id: &str, connector: Connector) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Connector>;
    async fn list(&self) -> Result<Vec<Connector>>;
    async fn close(&self) -> Result<()>;
}

/// SQLite-backed store, grounded on the single-connectors-table layout of
/// spec §6.3. Uses one connection behind a mutex so all callers observe the
/// same database, satisfying "the in-memory/embedded DB variant must ensure
/// all queriers see the same database" (spec §4.1).
pub struct SqliteConnectorStore {
    conn: Arc<AsyncMutex<Connection>>,
}

impl SqliteConnectorStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ConexusError::Config(format!("failed to open connector store: {e}")))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(AsyncMutex::new(conn)),
        })
    }

    pub fn open_in_memory_sqlite() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ConexusError::Config(format!("failed to open connector store: {e}")))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(AsyncMutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS connectors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                config TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_connectors_type ON connectors(type);
            CREATE INDEX IF NOT EXISTS idx_connectors_status ON connectors(status);",
        )
        .map_err(|e| ConexusError::Config(format!("failed to initialize schema: {e}")))?;
        Ok(())
    }

    fn row_to_connector(
        id: String,
        name: String,
        connector_type: String,
        config: String,
        status: String,
        created_at: i64,
        updated_at: i64,
    ) -> Result<Connector> {
        let connector_type: ConnectorType = connector_type
            .parse()
            .map_err(ConexusError::InvalidConfig)?;
        let status: ConnectorStatus = status.parse().map_err(ConexusError::InvalidConfig)?;
        let config: HashMap<String, serde_json::Value> = serde_json::from_str(&config)?;

        Ok(Connector {
            id,
            name,
            connector_type,
            config,
            status,
            created_at: timestamp_to_datetime(created_at),
            updated_at: timestamp_to_datetime(updated_at),
        })
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl ConnectorStore for SqliteConnectorStore {
    async fn add(&self, connector: Connector) -> Result<()> {
        connector
            .validate()
            .map_err(ConexusError::InvalidConfig)?;

        let conn = self.conn.lock().await;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM connectors WHERE id = ?1",
                params![connector.id],
                |row| row.get(0),
            )
            .ok();
        if existing.is_some() {
            return Err(ConexusError::InvalidConfig(format!(
                "connector {} already exists",
                connector.id
            )));
        }

        let config_json = serde_json::to_string(&connector.config)?;
        conn.execute(
            "INSERT INTO connectors (id, name, type, config, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                connector.id,
                connector.name,
                connector.connector_type.to_string(),
                config_json,
                connector.status.to_string(),
                connector.created_at.timestamp(),
                connector.updated_at.timestamp(),
            ],
        )
        .map_err(|e| ConexusError::InvalidConfig(format!("failed to insert connector: {e}")))?;

        debug!(connector_id = %connector.id, "connector added to store");
        Ok(())
    }

    async fn update(&self, id: &str, mut connector: Connector) -> Result<()> {
        connector
            .validate()
            .map_err(ConexusError::InvalidConfig)?;

        let conn = self.conn.lock().await;
        let created_at: i64 = conn
            .query_row(
                "SELECT created_at FROM connectors WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|_| ConexusError::NotFound(format!("connector {id} not found")))?;

        connector.created_at = timestamp_to_datetime(created_at);
        if connector.updated_at.timestamp() == 0 {
            connector.updated_at = Utc::now();
        }

        let config_json = serde_json::to_string(&connector.config)?;
        conn.execute(
            "UPDATE connectors SET name = ?1, type = ?2, config = ?3, status = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                connector.name,
                connector.connector_type.to_string(),
                config_json,
                connector.status.to_string(),
                connector.updated_at.timestamp(),
                id,
            ],
        )
        .map_err(|e| ConexusError::InvalidConfig(format!("failed to update connector: {e}")))?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute("DELETE FROM connectors WHERE id = ?1", params![id])
            .map_err(|e| ConexusError::InvalidConfig(format!("failed to remove connector: {e}")))?;
        if affected == 0 {
            return Err(ConexusError::NotFound(format!("connector {id} not found")));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Connector> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, name, type, config, status, created_at, updated_at
             FROM connectors WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .map_err(|_| ConexusError::NotFound(format!("connector {id} not found")))
        .and_then(|(id, name, ty, config, status, created_at, updated_at)| {
            Self::row_to_connector(id, name, ty, config, status, created_at, updated_at)
        })
    }

    async fn list(&self) -> Result<Vec<Connector>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, type, config, status, created_at, updated_at
                 FROM connectors ORDER BY created_at DESC",
            )
            .map_err(|e| ConexusError::Internal(anyhow::anyhow!(e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(|e| ConexusError::Internal(anyhow::anyhow!(e)))?;

        let mut connectors = Vec::new();
        for row in rows {
            let (id, name, ty, config, status, created_at, updated_at) =
                row.map_err(|e| ConexusError::Internal(anyhow::anyhow!(e)))?;
            connectors.push(Self::row_to_connector(
                id, name, ty, config, status, created_at, updated_at,
            )?);
        }
        Ok(connectors)
    }

    async fn close(&self) -> Result<()> {
        info!("closing connector store");
        Ok(())
    }
}

/// In-memory variant permitted for tests (spec §4.1), the teacher's exact
/// idiom: a `HashMap` behind a `tokio::sync::RwLock`.
#[derive(Default)]
pub struct InMemoryConnectorStore {
    connectors: RwLock<HashMap<String, Connector>>,
}

impl InMemoryConnectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectorStore for InMemoryConnectorStore {
    async fn add(&self, connector: Connector) -> Result<()> {
        connector
            .validate()
            .map_err(ConexusError::InvalidConfig)?;

        let mut connectors = self.connectors.write().await;
        if connectors.contains_key(&connector.id) {
            return Err(ConexusError::InvalidConfig(format!(
                "connector {} already exists",
                connector.id
            )));
        }
        connectors.insert(connector.id.clone(), connector);
        Ok(())
    }

    async fn update(&self, id: &str, mut connector: Connector) -> Result<()> {
        connector
            .validate()
            .map_err(ConexusError::InvalidConfig)?;

        let mut connectors = self.connectors.write().await;
        let existing = connectors
            .get(id)
            .ok_or_else(|| ConexusError::NotFound(format!("connector {id} not found")))?;

        connector.created_at = existing.created_at;
        if connector.updated_at.timestamp() == 0 {
            connector.updated_at = Utc::now();
        }
        connectors.insert(id.to_string(), connector);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        connectors
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ConexusError::NotFound(format!("connector {id} not found")))
    }

    async fn get(&self, id: &str) -> Result<Connector> {
        let connectors = self.connectors.read().await;
        connectors
            .get(id)
            .cloned()
            .ok_or_else(|| ConexusError::NotFound(format!("connector {id} not found")))
    }

    async fn list(&self) -> Result<Vec<Connector>> {
        let connectors = self.connectors.read().await;
        let mut all: Vec<Connector> = connectors.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
