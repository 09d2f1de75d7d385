use super::{ensure_raw_query, extend_expiry, system_clock, Clock, Partitioning, TimeseriesStore};
use crate::entity::EntityId;
use crate::error::StoreError;
use crate::kv::{is_live, Reading, TsQuery, Ttl};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

type SeriesKey = (EntityId, String);

#[derive(Clone, Debug)]
struct RawRow {
    reading: Reading,
    partition: i64,
    expires_at: Option<i64>,
}

/// Store kept entirely in process memory.
///
/// Lock-free maps per representation; nothing survives a restart.
pub struct InMemoryStore {
    partitioning: Partitioning,
    clock: Clock,

    /// (entity, key) -> partition start -> expiry
    partitions: DashMap<SeriesKey, BTreeMap<i64, Option<i64>>>,

    /// (entity, key) -> ts -> row
    raw: DashMap<SeriesKey, BTreeMap<i64, RawRow>>,

    /// entity -> key -> latest reading
    latest: DashMap<EntityId, BTreeMap<String, Reading>>,
}

impl InMemoryStore {
    pub fn new(partitioning: Partitioning) -> Self {
        Self::with_clock(partitioning, system_clock())
    }

    pub fn with_clock(partitioning: Partitioning, clock: Clock) -> Self {
        Self {
            partitioning,
            clock,
            partitions: DashMap::new(),
            raw: DashMap::new(),
            latest: DashMap::new(),
        }
    }

    /// Number of raw rows held for a key, expired rows included
    pub fn raw_len(&self, entity: &EntityId, key: &str) -> usize {
        self.raw
            .get(&(*entity, key.to_string()))
            .map_or(0, |series| series.len())
    }

    /// Partition starts recorded for a key, expired markers included
    pub fn partitions(&self, entity: &EntityId, key: &str) -> Vec<i64> {
        self.partitions
            .get(&(*entity, key.to_string()))
            .map(|parts| parts.keys().copied().collect())
            .unwrap_or_default()
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Partitioning::default())
    }
}

#[async_trait]
impl TimeseriesStore for InMemoryStore {
    async fn write_history(&self, entity: &EntityId, ts: i64, key: &str, ttl: Ttl) -> Result<(), StoreError> {
        let partition = self.partitioning.partition_ts(ts);
        let expires_at = ttl.expires_at(self.now());

        self.partitions
            .entry((*entity, key.to_string()))
            .or_default()
            .entry(partition)
            .and_modify(|current| *current = extend_expiry(*current, expires_at))
            .or_insert(expires_at);

        debug!(entity_id = %entity, key = %key, partition, "History partition recorded");
        Ok(())
    }

    async fn write_latest(&self, entity: &EntityId, reading: &Reading) -> Result<(), StoreError> {
        self.latest
            .entry(*entity)
            .or_default()
            .insert(reading.key.clone(), reading.clone());
        Ok(())
    }

    async fn write_raw(&self, entity: &EntityId, reading: &Reading, ttl: Ttl) -> Result<(), StoreError> {
        let row = RawRow {
            reading: reading.clone(),
            partition: self.partitioning.partition_ts(reading.ts),
            expires_at: ttl.expires_at(self.now()),
        };

        self.raw
            .entry((*entity, reading.key.clone()))
            .or_default()
            .insert(reading.ts, row);
        Ok(())
    }

    async fn query_range(&self, entity: &EntityId, query: &TsQuery) -> Result<Vec<Reading>, StoreError> {
        ensure_raw_query(query)?;
        if query.start_ts > query.end_ts {
            return Ok(Vec::new());
        }

        let now = self.now();
        let series_key = (*entity, query.key.clone());

        let first = self.partitioning.partition_ts(query.start_ts);
        let last = self.partitioning.partition_ts(query.end_ts);
        let live_partitions: Vec<i64> = match self.partitions.get(&series_key) {
            Some(parts) => parts
                .range(first..=last)
                .filter(|(_, expires_at)| is_live(**expires_at, now))
                .map(|(partition, _)| *partition)
                .collect(),
            None => return Ok(Vec::new()),
        };

        let series = match self.raw.get(&series_key) {
            Some(series) => series,
            None => return Ok(Vec::new()),
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let readings: Vec<Reading> = series
            .range(query.start_ts..=query.end_ts)
            .map(|(_, row)| row)
            .filter(|row| is_live(row.expires_at, now) && live_partitions.contains(&row.partition))
            .take(limit)
            .map(|row| row.reading.clone())
            .collect();

        Ok(readings)
    }

    async fn read_latest(&self, entity: &EntityId, key: &str) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .latest
            .get(entity)
            .and_then(|values| values.get(key).cloned()))
    }

    async fn read_all_latest(&self, entity: &EntityId) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .latest
            .get(entity)
            .map(|values| values.values().cloned().collect())
            .unwrap_or_default())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
