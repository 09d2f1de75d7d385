//! Fault-injecting store and registry wrappers for unit tests.

use crate::entity::{Entity, EntityId};
use crate::error::{RegistryError, StoreError, StoreOp};
use crate::kv::{Reading, TsQuery, Ttl};
use crate::registry::{EntityRegistry, InMemoryRegistry};
use crate::store::{InMemoryStore, TimeseriesStore};
use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Wraps an [`InMemoryStore`], failing or delaying chosen operations and
/// counting every call.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    failing: DashMap<StoreOp, FailMode>,
    failing_keys: DashMap<(StoreOp, String), FailMode>,
    delays: DashMap<StoreOp, Duration>,
    key_delays: DashMap<String, Duration>,
    calls: DashMap<StoreOp, usize>,
    /// Ops in the order they finished
    finished: Mutex<Vec<StoreOp>>,
}

#[derive(Clone, Copy)]
enum FailMode {
    Backend,
    Timeout,
    Panic,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapping(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail(self, op: StoreOp) -> Self {
        self.failing.insert(op, FailMode::Backend);
        self
    }

    /// Fail `op` only for readings and lookups on `key`
    pub fn fail_key(self, op: StoreOp, key: &str) -> Self {
        self.failing_keys.insert((op, key.to_string()), FailMode::Backend);
        self
    }

    pub fn time_out(self, op: StoreOp) -> Self {
        self.failing.insert(op, FailMode::Timeout);
        self
    }

    pub fn panic_on(self, op: StoreOp) -> Self {
        self.failing.insert(op, FailMode::Panic);
        self
    }

    pub fn delay(self, op: StoreOp, by: Duration) -> Self {
        self.delays.insert(op, by);
        self
    }

    /// Delay reads and writes touching `key`, on top of any per-op delay
    pub fn delay_key(self, key: &str, by: Duration) -> Self {
        self.key_delays.insert(key.to_string(), by);
        self
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.get(&op).map_or(0, |c| *c)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn finished(&self) -> Vec<StoreOp> {
        self.finished.lock().unwrap().clone()
    }

    async fn enter(&self, op: StoreOp, key: Option<&str>) -> Result<(), StoreError> {
        *self.calls.entry(op).or_insert(0) += 1;

        let mut wait = self.delays.get(&op).map(|d| *d).unwrap_or_default();
        if let Some(extra) = key.and_then(|k| self.key_delays.get(k)) {
            wait += *extra;
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let keyed = key.and_then(|k| self.failing_keys.get(&(op, k.to_string())).map(|m| *m));
        let mode = keyed.or_else(|| self.failing.get(&op).map(|m| *m));
        let result = match mode {
            None => Ok(()),
            Some(FailMode::Backend) => Err(StoreError::backend(op, anyhow!("injected {} failure", op))),
            Some(FailMode::Timeout) => Err(StoreError::Timeout {
                op,
                source: anyhow!("injected {} timeout", op),
            }),
            Some(FailMode::Panic) => panic!("injected {} panic", op),
        };
        self.finished.lock().unwrap().push(op);
        result
    }
}

#[async_trait]
impl TimeseriesStore for FaultyStore {
    async fn write_history(&self, entity: &EntityId, ts: i64, key: &str, ttl: Ttl) -> Result<(), StoreError> {
        self.enter(StoreOp::WriteHistory, Some(key)).await?;
        self.inner.write_history(entity, ts, key, ttl).await
    }

    async fn write_latest(&self, entity: &EntityId, reading: &Reading) -> Result<(), StoreError> {
        self.enter(StoreOp::WriteLatest, Some(&reading.key)).await?;
        self.inner.write_latest(entity, reading).await
    }

    async fn write_raw(&self, entity: &EntityId, reading: &Reading, ttl: Ttl) -> Result<(), StoreError> {
        self.enter(StoreOp::WriteRaw, Some(&reading.key)).await?;
        self.inner.write_raw(entity, reading, ttl).await
    }

    async fn query_range(&self, entity: &EntityId, query: &TsQuery) -> Result<Vec<Reading>, StoreError> {
        self.enter(StoreOp::QueryRange, Some(&query.key)).await?;
        self.inner.query_range(entity, query).await
    }

    async fn read_latest(&self, entity: &EntityId, key: &str) -> Result<Option<Reading>, StoreError> {
        self.enter(StoreOp::ReadLatest, Some(key)).await?;
        self.inner.read_latest(entity, key).await
    }

    async fn read_all_latest(&self, entity: &EntityId) -> Result<Vec<Reading>, StoreError> {
        self.enter(StoreOp::ReadAllLatest, None).await?;
        self.inner.read_all_latest(entity).await
    }

    fn backend_type(&self) -> &'static str {
        "faulty"
    }
}

/// Wraps an [`InMemoryRegistry`] with call counters and optional failures.
#[derive(Default)]
pub struct FaultyRegistry {
    pub inner: InMemoryRegistry,
    fail_find: AtomicBool,
    fail_save: AtomicBool,
    finds: AtomicUsize,
    saves: AtomicUsize,
}

impl FaultyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_entity(entity: Entity) -> Self {
        let registry = Self::new();
        registry.inner.save(&entity).await.unwrap();
        registry
    }

    pub fn fail_find(&self) {
        self.fail_find.store(true, Ordering::SeqCst);
    }

    pub fn fail_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityRegistry for FaultyRegistry {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Entity>, RegistryError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(RegistryError::Backend(anyhow!("injected find failure")));
        }
        self.inner.find_by_id(id).await
    }

    async fn save(&self, entity: &Entity) -> Result<(), RegistryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(RegistryError::Backend(anyhow!("injected save failure")));
        }
        self.inner.save(entity).await
    }
}
