//! Error types for ingestion and queries.
//!
//! Validation failures never touch storage. Storage and registry failures
//! carry the backend error as their source, plus the operation that failed.

use crate::entity::EntityId;
use crate::ingest::BatchOutcome;
use std::fmt;

/// The physical operation a [`StoreError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    WriteHistory,
    WriteLatest,
    WriteRaw,
    QueryRange,
    ReadLatest,
    ReadAllLatest,
}

impl StoreOp {
    /// The three writes issued for every ingested reading.
    pub const WRITES: [StoreOp; 3] = [StoreOp::WriteHistory, StoreOp::WriteLatest, StoreOp::WriteRaw];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::WriteHistory => "write_history",
            StoreOp::WriteLatest => "write_latest",
            StoreOp::WriteRaw => "write_raw",
            StoreOp::QueryRange => "query_range",
            StoreOp::ReadLatest => "read_latest",
            StoreOp::ReadAllLatest => "read_all_latest",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local input validation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("incorrect entity id: {0}")]
    InvalidEntity(String),

    #[error("incorrect reading: {0}")]
    InvalidReading(String),

    #[error("incorrect query: {0}")]
    InvalidQuery(String),

    #[error("incorrect key: {0:?}")]
    InvalidKey(String),
}

/// Failure reported by a timeseries store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend gave up waiting (lock contention, client timeout).
    #[error("{op} timed out: {source}")]
    Timeout {
        op: StoreOp,
        #[source]
        source: anyhow::Error,
    },

    #[error("{op} failed: {source}")]
    Backend {
        op: StoreOp,
        #[source]
        source: anyhow::Error,
    },

    #[error("{op} unsupported: {reason}")]
    Unsupported { op: StoreOp, reason: String },

    /// A stored row could not be turned back into a reading.
    #[error("{op} returned a corrupt row: {reason}")]
    Corrupt { op: StoreOp, reason: String },

    /// The task running the operation panicked or was aborted.
    #[error("{op} task failed: {reason}")]
    TaskFailed { op: StoreOp, reason: String },
}

impl StoreError {
    pub fn backend(op: StoreOp, source: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend {
            op,
            source: source.into(),
        }
    }

    pub fn op(&self) -> StoreOp {
        match self {
            StoreError::Timeout { op, .. }
            | StoreError::Backend { op, .. }
            | StoreError::Unsupported { op, .. }
            | StoreError::Corrupt { op, .. }
            | StoreError::TaskFailed { op, .. } => *op,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Failure looking up or saving an entity record.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("registry backend error: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("registry task failed: {0}")]
    TaskFailed(String),
}

/// Top-level error returned by the coordinator and the query router.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// At least one reading or the snapshot update failed. The outcome holds
    /// the full per-reading breakdown, successes included.
    #[error("batch ingestion failed: {}", .0.summary())]
    Batch(Box<BatchOutcome>),
}

impl TelemetryError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            TelemetryError::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            TelemetryError::Store(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_batch(self) -> Option<BatchOutcome> {
        match self {
            TelemetryError::Batch(outcome) => Some(*outcome),
            _ => None,
        }
    }
}
