//! Ingestion coordinator: validation, fan-out writes, snapshot update.
//!
//! Each accepted reading is written three times (history, latest, raw) on
//! separate tasks. A batch launches every write at once, then updates the
//! entity snapshot alongside them. Failures never cancel sibling writes;
//! every outcome is collected before the call returns.

pub mod config;
mod metrics;
mod outcome;


pub use config::IngestConfig;
pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
pub use outcome::{BatchOutcome, ReadingOutcome, ReadingStatus, SnapshotStatus, WriteOutcome};

use crate::entity::EntityId;
use crate::error::{RegistryError, StoreError, StoreOp, TelemetryError};
use crate::kv::{Reading, Ttl};
use crate::registry::EntityRegistry;
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::store::TimeseriesStore;
use crate::validation::{validate_entity, validate_reading};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

type WriteResult = (usize, StoreOp, Result<(), StoreError>);

/// Set of in-flight store writes, each tagged with its reading index and
/// operation. Results come back in completion order.
struct WriteGroup {
    tasks: JoinSet<WriteResult>,
}

impl WriteGroup {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    fn spawn<F>(&mut self, index: usize, op: StoreOp, write: F)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(write).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(StoreError::TaskFailed {
                    op,
                    reason: "write panicked".to_string(),
                }),
            };
            (index, op, result)
        });
    }

    /// Next finished write. Tasks cancelled by runtime shutdown are skipped;
    /// their operation then shows up as missing in the reading's outcome.
    async fn next(&mut self) -> Option<WriteResult> {
        loop {
            match self.tasks.join_next().await? {
                Ok(done) => return Some(done),
                Err(e) => error!(error = %e, "Write task did not complete"),
            }
        }
    }
}

/// Orchestrates ingestion of readings for monitored entities.
///
/// Stateless apart from metrics; safe to share across many concurrent callers.
pub struct IngestionCoordinator {
    store: Arc<dyn TimeseriesStore>,
    registry: Arc<dyn EntityRegistry>,
    config: IngestConfig,
    metrics: IngestMetrics,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn TimeseriesStore>,
        registry: Arc<dyn EntityRegistry>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            metrics: IngestMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    fn effective_ttl(&self, ttl: Option<Ttl>) -> Ttl {
        ttl.unwrap_or_else(|| self.config.default_ttl())
    }

    fn spawn_reading_writes(
        &self,
        group: &mut WriteGroup,
        index: usize,
        entity: EntityId,
        reading: Arc<Reading>,
        ttl: Ttl,
    ) {
        let store = Arc::clone(&self.store);
        let r = Arc::clone(&reading);
        group.spawn(index, StoreOp::WriteHistory, async move {
            store.write_history(&entity, r.ts, &r.key, ttl).await
        });

        let store = Arc::clone(&self.store);
        let r = Arc::clone(&reading);
        group.spawn(index, StoreOp::WriteLatest, async move {
            store.write_latest(&entity, &r).await
        });

        let store = Arc::clone(&self.store);
        group.spawn(index, StoreOp::WriteRaw, async move {
            store.write_raw(&entity, &reading, ttl).await
        });
    }

    /// Save a single reading.
    ///
    /// Resolves once all three writes have finished. The first failure to
    /// complete becomes the error; any later failures are logged.
    pub async fn save(&self, entity: &EntityId, reading: Reading, ttl: Option<Ttl>) -> Result<(), TelemetryError> {
        validate_entity(entity)?;
        if let Err(e) = validate_reading(&reading) {
            self.metrics.record_rejected();
            return Err(e.into());
        }

        let ttl = self.effective_ttl(ttl);
        let key = reading.key.clone();
        let mut group = WriteGroup::new();
        self.spawn_reading_writes(&mut group, 0, *entity, Arc::new(reading), ttl);

        let mut first_error: Option<StoreError> = None;
        while let Some((_, op, result)) = group.next().await {
            match result {
                Ok(()) => debug!(entity_id = %entity, key = %key, op = %op, "Write committed"),
                Err(e) => {
                    self.metrics.record_write_failure();
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        warn!(entity_id = %entity, key = %key, op = %op, error = %e, "Additional write failure");
                    }
                }
            }
        }

        self.metrics.touch();
        match first_error {
            Some(e) => {
                self.metrics.record_failed(1);
                warn!(entity_id = %entity, key = %key, error = %e, "Reading not fully written");
                Err(e.into())
            }
            None => {
                self.metrics.record_written(1);
                Ok(())
            }
        }
    }

    /// Save a batch of readings and refresh the entity's sensor snapshot.
    ///
    /// Invalid readings are rejected individually; the rest are written
    /// concurrently. The snapshot built from the accepted readings replaces
    /// the entity's previous one. Returns `Err(TelemetryError::Batch)` with
    /// the full breakdown if any reading or the snapshot update failed.
    pub async fn save_batch(
        &self,
        entity: &EntityId,
        readings: Vec<Reading>,
        ttl: Option<Ttl>,
    ) -> Result<BatchOutcome, TelemetryError> {
        validate_entity(entity)?;

        if readings.is_empty() {
            debug!(entity_id = %entity, "Empty batch, nothing to ingest");
            return Ok(BatchOutcome::empty());
        }

        let ttl = self.effective_ttl(ttl);
        let mut group = WriteGroup::new();
        let mut builder = SnapshotBuilder::new();
        let mut outcomes = Vec::with_capacity(readings.len());

        for (index, reading) in readings.into_iter().enumerate() {
            let key = reading.key.clone();
            let ts = reading.ts;

            let status = match validate_reading(&reading) {
                Ok(()) => {
                    builder.push(&reading);
                    self.spawn_reading_writes(&mut group, index, *entity, Arc::new(reading), ttl);
                    ReadingStatus::Written(WriteOutcome::default())
                }
                Err(e) => {
                    warn!(entity_id = %entity, index, key = %key, error = %e, "Reading rejected");
                    self.metrics.record_rejected();
                    ReadingStatus::Rejected(e)
                }
            };

            outcomes.push(ReadingOutcome {
                index,
                key,
                ts,
                status,
            });
        }

        let snapshot_task = if builder.is_empty() {
            None
        } else {
            let registry = Arc::clone(&self.registry);
            let entity = *entity;
            let snapshot = builder.finish();
            Some(tokio::spawn(async move {
                replace_snapshot(registry.as_ref(), &entity, snapshot).await
            }))
        };

        while let Some((index, op, result)) = group.next().await {
            if let Err(e) = &result {
                self.metrics.record_write_failure();
                warn!(entity_id = %entity, index, op = %op, error = %e, "Write failed");
            }
            if let Some(ReadingOutcome {
                status: ReadingStatus::Written(writes),
                ..
            }) = outcomes.get_mut(index)
            {
                writes.record(op, result);
            }
        }

        let snapshot = match snapshot_task {
            None => SnapshotStatus::Skipped,
            Some(handle) => {
                let result = handle
                    .await
                    .unwrap_or_else(|e| Err(RegistryError::TaskFailed(e.to_string())));
                match result {
                    Ok(keys) => {
                        self.metrics.record_snapshot_update();
                        SnapshotStatus::Saved { keys }
                    }
                    Err(e) => {
                        self.metrics.record_snapshot_failure();
                        error!(entity_id = %entity, error = %e, "Snapshot update failed");
                        SnapshotStatus::Failed(e)
                    }
                }
            }
        };

        let outcome = BatchOutcome {
            readings: outcomes,
            snapshot,
        };

        let written = outcome
            .readings
            .iter()
            .filter(|r| r.is_success())
            .count() as u64;
        let failed_writes = outcome
            .readings
            .iter()
            .filter(|r| r.writes().is_some() && !r.is_success())
            .count() as u64;
        self.metrics.record_written(written);
        self.metrics.record_failed(failed_writes);
        self.metrics.touch();

        info!(
            entity_id = %entity,
            total = outcome.total(),
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "Batch ingested"
        );

        if outcome.is_success() {
            Ok(outcome)
        } else {
            Err(TelemetryError::Batch(Box::new(outcome)))
        }
    }
}

/// Load the entity, swap in the new snapshot document and save it back.
async fn replace_snapshot(
    registry: &dyn EntityRegistry,
    entity_id: &EntityId,
    snapshot: Snapshot,
) -> Result<usize, RegistryError> {
    let mut entity = registry
        .find_by_id(entity_id)
        .await?
        .ok_or(RegistryError::NotFound(*entity_id))?;

    entity.sensors = Some(snapshot.to_document());
    registry.save(&entity).await?;

    debug!(entity_id = %entity_id, keys = snapshot.len(), "Snapshot replaced");
    Ok(snapshot.len())
}
