//! Timeseries persistence using SQLite.
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool, so async callers never stall the runtime on disk I/O.

use super::{ensure_raw_query, system_clock, Clock, Partitioning, TimeseriesStore};
use crate::entity::EntityId;
use crate::error::{StoreError, StoreOp};
use crate::kv::{RawReading, Reading, TsQuery, Ttl};
use crate::validation::validate_raw_reading;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ts_kv_partitions (
        entity_type TEXT    NOT NULL,
        entity_id   TEXT    NOT NULL,
        key         TEXT    NOT NULL,
        part_ts     INTEGER NOT NULL,
        expires_at  INTEGER,
        PRIMARY KEY (entity_type, entity_id, key, part_ts)
    );
    CREATE TABLE IF NOT EXISTS ts_kv (
        entity_type TEXT    NOT NULL,
        entity_id   TEXT    NOT NULL,
        key         TEXT    NOT NULL,
        part_ts     INTEGER NOT NULL,
        ts          INTEGER NOT NULL,
        bool_v      INTEGER,
        str_v       TEXT,
        long_v      INTEGER,
        dbl_v       REAL,
        expires_at  INTEGER,
        PRIMARY KEY (entity_type, entity_id, key, part_ts, ts)
    );
    CREATE TABLE IF NOT EXISTS ts_kv_latest (
        entity_type TEXT    NOT NULL,
        entity_id   TEXT    NOT NULL,
        key         TEXT    NOT NULL,
        ts          INTEGER NOT NULL,
        bool_v      INTEGER,
        str_v       TEXT,
        long_v      INTEGER,
        dbl_v       REAL,
        PRIMARY KEY (entity_type, entity_id, key)
    );
";

/// Persists readings in SQLite.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    partitioning: Partitioning,
    clock: Clock,
}

impl SqliteStore {
    /// Opens (or creates) the database and ensures the tables exist.
    pub fn open<P: AsRef<Path>>(path: P, partitioning: Partitioning, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open timeseries DB at {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        Self::from_connection(conn, partitioning, system_clock())
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory(partitioning: Partitioning, clock: Clock) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory DB")?;
        Self::from_connection(conn, partitioning, clock)
    }

    fn from_connection(conn: Connection, partitioning: Partitioning, clock: Clock) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create timeseries tables")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            partitioning,
            clock,
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: StoreOp, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::backend(op, anyhow!("connection mutex poisoned")))?;
            f(&guard).map_err(|e| map_sqlite_error(op, e))
        })
        .await
        .map_err(|e| StoreError::TaskFailed {
            op,
            reason: e.to_string(),
        })?
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }
}

/// A busy or locked database means the busy timeout elapsed.
fn map_sqlite_error(op: StoreOp, err: rusqlite::Error) -> StoreError {
    let busy = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if busy {
        StoreError::Timeout {
            op,
            source: err.into(),
        }
    } else {
        StoreError::backend(op, err)
    }
}

fn entity_columns(entity: &EntityId) -> (&'static str, String) {
    (entity.entity_type.as_str(), entity.id.to_string())
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawReading> {
    Ok(RawReading {
        ts: row.get(0)?,
        key: row.get(1)?,
        bool_v: row.get(2)?,
        str_v: row.get(3)?,
        long_v: row.get(4)?,
        dbl_v: row.get(5)?,
    })
}

fn decode_rows(op: StoreOp, rows: Vec<RawReading>) -> Result<Vec<Reading>, StoreError> {
    rows.into_iter()
        .map(|raw| {
            validate_raw_reading(raw).map_err(|e| StoreError::Corrupt {
                op,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl TimeseriesStore for SqliteStore {
    async fn write_history(&self, entity: &EntityId, ts: i64, key: &str, ttl: Ttl) -> Result<(), StoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let key = key.to_string();
        let partition = self.partitioning.partition_ts(ts);
        let expires_at = ttl.expires_at(self.now());

        self.with_conn(StoreOp::WriteHistory, move |conn| {
            conn.execute(
                "INSERT INTO ts_kv_partitions (entity_type, entity_id, key, part_ts, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (entity_type, entity_id, key, part_ts) DO UPDATE SET
                     expires_at = CASE
                         WHEN ts_kv_partitions.expires_at IS NULL OR excluded.expires_at IS NULL THEN NULL
                         ELSE MAX(ts_kv_partitions.expires_at, excluded.expires_at)
                     END",
                params![entity_type, entity_id, key, partition, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn write_latest(&self, entity: &EntityId, reading: &Reading) -> Result<(), StoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let raw = RawReading::from(reading.clone());

        self.with_conn(StoreOp::WriteLatest, move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO ts_kv_latest
                     (entity_type, entity_id, key, ts, bool_v, str_v, long_v, dbl_v)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entity_type,
                    entity_id,
                    raw.key,
                    raw.ts,
                    raw.bool_v,
                    raw.str_v,
                    raw.long_v,
                    raw.dbl_v
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn write_raw(&self, entity: &EntityId, reading: &Reading, ttl: Ttl) -> Result<(), StoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let raw = RawReading::from(reading.clone());
        let partition = self.partitioning.partition_ts(raw.ts);
        let expires_at = ttl.expires_at(self.now());

        self.with_conn(StoreOp::WriteRaw, move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO ts_kv
                     (entity_type, entity_id, key, part_ts, ts, bool_v, str_v, long_v, dbl_v, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entity_type,
                    entity_id,
                    raw.key,
                    partition,
                    raw.ts,
                    raw.bool_v,
                    raw.str_v,
                    raw.long_v,
                    raw.dbl_v,
                    expires_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_range(&self, entity: &EntityId, query: &TsQuery) -> Result<Vec<Reading>, StoreError> {
        ensure_raw_query(query)?;
        if query.start_ts > query.end_ts {
            return Ok(Vec::new());
        }

        let (entity_type, entity_id) = entity_columns(entity);
        let key = query.key.clone();
        let (start_ts, end_ts) = (query.start_ts, query.end_ts);
        let first = self.partitioning.partition_ts(start_ts);
        let last = self.partitioning.partition_ts(end_ts);
        // SQLite treats a negative LIMIT as unbounded
        let limit = query
            .limit
            .map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let now = self.now();

        let rows = self
            .with_conn(StoreOp::QueryRange, move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ts, key, bool_v, str_v, long_v, dbl_v FROM ts_kv
                     WHERE entity_type = ?1 AND entity_id = ?2 AND key = ?3
                       AND ts BETWEEN ?4 AND ?5
                       AND (expires_at IS NULL OR expires_at > ?8)
                       AND part_ts IN (
                           SELECT part_ts FROM ts_kv_partitions
                           WHERE entity_type = ?1 AND entity_id = ?2 AND key = ?3
                             AND part_ts BETWEEN ?6 AND ?7
                             AND (expires_at IS NULL OR expires_at > ?8)
                       )
                     ORDER BY ts ASC
                     LIMIT ?9",
                )?;
                let rows = stmt
                    .query_map(
                        params![entity_type, entity_id, key, start_ts, end_ts, first, last, now, limit],
                        raw_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        decode_rows(StoreOp::QueryRange, rows)
    }

    async fn read_latest(&self, entity: &EntityId, key: &str) -> Result<Option<Reading>, StoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let key = key.to_string();

        let rows = self
            .with_conn(StoreOp::ReadLatest, move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ts, key, bool_v, str_v, long_v, dbl_v FROM ts_kv_latest
                     WHERE entity_type = ?1 AND entity_id = ?2 AND key = ?3",
                )?;
                let rows = stmt
                    .query_map(params![entity_type, entity_id, key], raw_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(decode_rows(StoreOp::ReadLatest, rows)?.into_iter().next())
    }

    async fn read_all_latest(&self, entity: &EntityId) -> Result<Vec<Reading>, StoreError> {
        let (entity_type, entity_id) = entity_columns(entity);

        let rows = self
            .with_conn(StoreOp::ReadAllLatest, move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ts, key, bool_v, str_v, long_v, dbl_v FROM ts_kv_latest
                     WHERE entity_type = ?1 AND entity_id = ?2
                     ORDER BY key ASC",
                )?;
                let rows = stmt
                    .query_map(params![entity_type, entity_id], raw_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        decode_rows(StoreOp::ReadAllLatest, rows)
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
