//! Entity persistence using SQLite.
//!
//! JSON documents (`additional_info`, `sensors`) are stored as text.

use super::EntityRegistry;
use crate::entity::{Entity, EntityId};
use crate::error::RegistryError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Persists entity records in SQLite.
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open registry DB at {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory DB")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_type     TEXT NOT NULL,
                entity_id       TEXT NOT NULL,
                name            TEXT NOT NULL,
                additional_info TEXT,
                sensors         TEXT,
                PRIMARY KEY (entity_type, entity_id)
            );",
        )
        .context("Failed to create entities table")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RegistryError::Backend(anyhow!("connection mutex poisoned")))?;
            f(&guard).map_err(RegistryError::Backend)
        })
        .await
        .map_err(|e| RegistryError::TaskFailed(e.to_string()))?
    }
}

fn encode_json(value: &Option<Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode entity document")
}

fn decode_json(text: Option<String>) -> Result<Option<Value>> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .context("Failed to decode entity document")
}

#[async_trait]
impl EntityRegistry for SqliteRegistry {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Entity>, RegistryError> {
        let id = *id;
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT name, additional_info, sensors FROM entities
                     WHERE entity_type = ?1 AND entity_id = ?2",
                    params![id.entity_type.as_str(), id.id.to_string()],
                    |row| {
                        let name: String = row.get(0)?;
                        let additional_info: Option<String> = row.get(1)?;
                        let sensors: Option<String> = row.get(2)?;
                        Ok((name, additional_info, sensors))
                    },
                )
                .optional()
                .context("Failed to query entity")?;

            match row {
                Some((name, additional_info, sensors)) => Ok(Some(Entity {
                    id,
                    name,
                    additional_info: decode_json(additional_info)?,
                    sensors: decode_json(sensors)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, entity: &Entity) -> Result<(), RegistryError> {
        let entity = entity.clone();
        self.with_conn(move |conn| {
            let additional_info = encode_json(&entity.additional_info)?;
            let sensors = encode_json(&entity.sensors)?;
            conn.execute(
                "INSERT OR REPLACE INTO entities (entity_type, entity_id, name, additional_info, sensors)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entity.id.entity_type.as_str(),
                    entity.id.id.to_string(),
                    entity.name,
                    additional_info,
                    sensors
                ],
            )
            .context("Failed to save entity")?;
            Ok(())
        })
        .await
    }
}
