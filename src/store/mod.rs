//! Timeseries storage contract and reference backends.
//!
//! Every reading is kept in three physical representations:
//! - history: the set of time partitions a key has data in
//! - latest: the most recently written reading per key
//! - raw: every reading, partitioned, with optional expiry
//!
//! The writes are independent; backends give no atomicity across them.

use crate::entity::EntityId;
use crate::error::{StoreError, StoreOp};
use crate::kv::{Aggregation, Reading, TsQuery, Ttl};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod config;
mod memory;
mod sqlite;

#[cfg(test)]
mod tests;

pub use config::{StoreBackend, StoreConfig};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Source of "now" in epoch milliseconds, used for TTL bookkeeping.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp_millis())
}

/// Durable storage for readings.
#[async_trait]
pub trait TimeseriesStore: Send + Sync {
    /// Record that `key` has data in the partition containing `ts`
    async fn write_history(&self, entity: &EntityId, ts: i64, key: &str, ttl: Ttl) -> Result<(), StoreError>;

    /// Overwrite the latest value of the reading's key
    async fn write_latest(&self, entity: &EntityId, reading: &Reading) -> Result<(), StoreError>;

    /// Append the reading to the raw series
    async fn write_raw(&self, entity: &EntityId, reading: &Reading, ttl: Ttl) -> Result<(), StoreError>;

    /// Readings for one key within the query range, ascending by timestamp
    async fn query_range(&self, entity: &EntityId, query: &TsQuery) -> Result<Vec<Reading>, StoreError>;

    async fn read_latest(&self, entity: &EntityId, key: &str) -> Result<Option<Reading>, StoreError>;

    /// One reading per known key, ordered by key
    async fn read_all_latest(&self, entity: &EntityId) -> Result<Vec<Reading>, StoreError>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Granularity of the time partitions recorded by history writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partitioning {
    Minutes,
    Hours,
    Days,
    #[default]
    Months,
    Years,
    Indefinite,
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

impl Partitioning {
    /// Start (epoch ms, UTC) of the partition containing `ts`
    pub fn partition_ts(&self, ts: i64) -> i64 {
        match self {
            Partitioning::Minutes => truncate(ts, MINUTE_MS),
            Partitioning::Hours => truncate(ts, HOUR_MS),
            Partitioning::Days => truncate(ts, DAY_MS),
            Partitioning::Months => calendar_start(ts, |d| NaiveDate::from_ymd_opt(d.year(), d.month(), 1)),
            Partitioning::Years => calendar_start(ts, |d| NaiveDate::from_ymd_opt(d.year(), 1, 1)),
            Partitioning::Indefinite => 0,
        }
    }
}

fn truncate(ts: i64, width: i64) -> i64 {
    ts - ts.rem_euclid(width)
}

/// Falls back to day partitions for timestamps chrono cannot represent.
fn calendar_start(ts: i64, first_day: impl Fn(&DateTime<Utc>) -> Option<NaiveDate>) -> i64 {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .and_then(|dt| first_day(&dt))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc().timestamp_millis())
        .unwrap_or_else(|| truncate(ts, DAY_MS))
}

/// Only raw range reads are served; aggregation functions live elsewhere.
pub(crate) fn ensure_raw_query(query: &TsQuery) -> Result<(), StoreError> {
    match query.aggregation {
        Some(Aggregation::None) => Ok(()),
        other => Err(StoreError::Unsupported {
            op: StoreOp::QueryRange,
            reason: format!("aggregation {:?} is not supported by this backend", other),
        }),
    }
}

/// Combine the expiry of an existing partition marker with a new write.
/// A marker without expiry stays forever; otherwise the later expiry wins.
pub(crate) fn extend_expiry(current: Option<i64>, new: Option<i64>) -> Option<i64> {
    match (current, new) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// Open the store selected by configuration
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn TimeseriesStore>> {
    let store: Arc<dyn TimeseriesStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new(config.partitioning)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(
            &config.path,
            config.partitioning,
            Duration::from_millis(config.busy_timeout_ms),
        )?),
    };

    info!(
        backend = store.backend_type(),
        partitioning = ?config.partitioning,
        "Timeseries store opened"
    );

    Ok(store)
}
