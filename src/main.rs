use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tskv::config::{load_config, TelemetryConfig};
use tskv::entity::{parse_entity_id, Entity};
use tskv::registry::open_registry;
use tskv::store::open_store;
use tskv::{IngestionCoordinator, QueryRouter, Reading, TelemetryError};

const USAGE: &str = "usage: tskv <ENTITY_ID> <READINGS_JSON> [CONFIG_TOML]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tskv=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (entity_arg, readings_path, config_path) = match args.as_slice() {
        [entity, readings] => (entity, readings, None),
        [entity, readings, config] => (entity, readings, Some(config)),
        _ => bail!(USAGE),
    };

    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => TelemetryConfig::default(),
    };
    config.apply_env_overrides();

    let entity_id = parse_entity_id(entity_arg)
        .map_err(|e| anyhow::anyhow!("invalid entity id {:?}: {}", entity_arg, e))?;

    let contents = std::fs::read_to_string(readings_path)
        .with_context(|| format!("Failed to read readings file {}", readings_path))?;
    let readings: Vec<Reading> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse readings file {}", readings_path))?;

    info!(entity_id = %entity_id, readings = readings.len(), "tskv starting");

    let store = open_store(&config.store)?;
    let registry = open_registry(&config.store)?;

    if registry.find_by_id(&entity_id).await?.is_none() {
        registry.save(&Entity::new(entity_id, entity_id.to_string())).await?;
        info!(entity_id = %entity_id, "Registered new entity");
    }

    let coordinator = IngestionCoordinator::new(Arc::clone(&store), Arc::clone(&registry), config.ingest.clone());
    let router = QueryRouter::new(store);

    let outcome = match coordinator.save_batch(&entity_id, readings, None).await {
        Ok(outcome) => outcome,
        Err(TelemetryError::Batch(outcome)) => {
            for failed in outcome.failures() {
                warn!(index = failed.index, key = %failed.key, "Reading not fully ingested");
            }
            bail!("{}", outcome.summary());
        }
        Err(e) => return Err(e.into()),
    };

    let latest = router.find_all_latest(&entity_id).await?;
    let report = serde_json::json!({
        "entity_id": entity_id.to_string(),
        "ingested": outcome.succeeded(),
        "latest": latest,
        "metrics": coordinator.metrics().snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
