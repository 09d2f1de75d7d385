//! Entity registry: lookup and update of entity records.
//!
//! The ingestion path only ever reads an entity, replaces its `sensors`
//! document and writes it back. There is no versioning, so concurrent
//! batches for one entity race and the last save wins.

use crate::entity::{Entity, EntityId};
use crate::error::RegistryError;
use crate::store::{StoreBackend, StoreConfig};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

mod sqlite;

pub use sqlite::SqliteRegistry;

#[async_trait]
pub trait EntityRegistry: Send + Sync {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Entity>, RegistryError>;

    /// Insert or replace the record
    async fn save(&self, entity: &Entity) -> Result<(), RegistryError>;
}

/// Registry held in process memory
#[derive(Default)]
pub struct InMemoryRegistry {
    entities: DashMap<EntityId, Entity>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[async_trait]
impl EntityRegistry for InMemoryRegistry {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Entity>, RegistryError> {
        Ok(self.entities.get(id).map(|e| e.clone()))
    }

    async fn save(&self, entity: &Entity) -> Result<(), RegistryError> {
        self.entities.insert(entity.id, entity.clone());
        Ok(())
    }
}

/// Open the registry matching the store configuration
pub fn open_registry(config: &StoreConfig) -> Result<Arc<dyn EntityRegistry>> {
    let registry: Arc<dyn EntityRegistry> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryRegistry::new()),
        StoreBackend::Sqlite => Arc::new(SqliteRegistry::open(
            &config.path,
            Duration::from_millis(config.busy_timeout_ms),
        )?),
    };
    Ok(registry)
}
