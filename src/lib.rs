// Entity identifiers and records
pub mod entity;

// Reading and query model
pub mod kv;

// Error types
pub mod error;

// Input validation
pub mod validation;

// Timeseries storage backends
pub mod store;

// Entity registry backends
pub mod registry;

// Per-entity sensor snapshot
pub mod snapshot;

// Ingestion fan-out and outcome aggregation
pub mod ingest;

// Read path
pub mod query;

// Configuration loading
pub mod config;

#[cfg(test)]
mod testing;

pub use entity::{Entity, EntityId, EntityType};
pub use error::{RegistryError, StoreError, StoreOp, TelemetryError, ValidationError};
pub use ingest::{BatchOutcome, IngestionCoordinator};
pub use kv::{KvValue, Reading, TsQuery, Ttl};
pub use query::QueryRouter;
