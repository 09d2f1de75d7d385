//! Read path: validated range and latest-value lookups.

use crate::entity::EntityId;
use crate::error::{StoreError, TelemetryError};
use crate::kv::{Reading, TsQuery};
use crate::store::TimeseriesStore;
use crate::validation::{validate_entity, validate_key, validate_query};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};


/// Routes read requests to the timeseries store.
///
/// All input is validated before the first store call. Fan-out reads run
/// concurrently; results come back in input order and any single failure
/// fails the whole request.
pub struct QueryRouter {
    store: Arc<dyn TimeseriesStore>,
}

impl QueryRouter {
    pub fn new(store: Arc<dyn TimeseriesStore>) -> Self {
        Self { store }
    }

    /// Run every range query and concatenate the results in query order.
    pub async fn find_all(&self, entity: &EntityId, queries: &[TsQuery]) -> Result<Vec<Reading>, TelemetryError> {
        validate_entity(entity)?;
        for query in queries {
            validate_query(query)?;
        }

        let results = join_all(
            queries
                .iter()
                .map(|query| self.store.query_range(entity, query)),
        )
        .await;

        let per_query = first_error(entity, results)?;
        let readings: Vec<Reading> = per_query.into_iter().flatten().collect();

        debug!(entity_id = %entity, queries = queries.len(), readings = readings.len(), "Range queries complete");
        Ok(readings)
    }

    /// Latest reading for each key, aligned with `keys`. Unknown keys yield `None`.
    pub async fn find_latest(&self, entity: &EntityId, keys: &[String]) -> Result<Vec<Option<Reading>>, TelemetryError> {
        validate_entity(entity)?;
        for key in keys {
            validate_key(key)?;
        }

        let results = join_all(keys.iter().map(|key| self.store.read_latest(entity, key))).await;
        Ok(first_error(entity, results)?)
    }

    pub async fn find_all_latest(&self, entity: &EntityId) -> Result<Vec<Reading>, TelemetryError> {
        validate_entity(entity)?;
        Ok(self.store.read_all_latest(entity).await?)
    }
}

/// Unwrap joined results, keeping the first error in input order and
/// logging the rest.
fn first_error<T>(entity: &EntityId, results: Vec<Result<T, StoreError>>) -> Result<Vec<T>, StoreError> {
    let mut values = Vec::with_capacity(results.len());
    let mut error: Option<StoreError> = None;

    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(e) if error.is_none() => error = Some(e),
            Err(e) => warn!(entity_id = %entity, index, error = %e, "Additional read failure"),
        }
    }

    match error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
