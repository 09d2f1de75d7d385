use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub use crate::ingest::IngestConfig;
pub use crate::store::{StoreBackend, StoreConfig};

/// Complete tskv configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl TelemetryConfig {
    /// Override file settings from `TSKV_*` env vars. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TSKV_DEFAULT_TTL_SECONDS") {
            match v.parse::<u64>() {
                Ok(n) => self.ingest.default_ttl_seconds = n,
                Err(_) => warn!(value = %v, "Ignoring invalid TSKV_DEFAULT_TTL_SECONDS"),
            }
        }
        if let Some(v) = lookup("TSKV_STORE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "sqlite" => self.store.backend = StoreBackend::Sqlite,
                _ => warn!(value = %v, "Ignoring invalid TSKV_STORE_BACKEND"),
            }
        }
        if let Some(v) = lookup("TSKV_STORE_PATH") {
            self.store.path = v.into();
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<TelemetryConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: TelemetryConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Partitioning;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.ingest.default_ttl_seconds, 0);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.partitioning, Partitioning::Months);
        assert_eq!(config.store.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [ingest]
            default_ttl_seconds = 3600

            [store]
            backend = "memory"
            path = "/tmp/telemetry.db"
            partitioning = "days"
            busy_timeout_ms = 250
        "#;

        let config: TelemetryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ingest.default_ttl_seconds, 3600);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.path, Path::new("/tmp/telemetry.db"));
        assert_eq!(config.store.partitioning, Partitioning::Days);
        assert_eq!(config.store.busy_timeout_ms, 250);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [store]
            partitioning = "indefinite"
        "#;

        let config: TelemetryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.store.partitioning, Partitioning::Indefinite);
        assert_eq!(config.store.backend, StoreBackend::Sqlite); // Default
        assert_eq!(config.ingest.default_ttl_seconds, 0); // Default
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TSKV_DEFAULT_TTL_SECONDS", "90"),
            ("TSKV_STORE_BACKEND", "Memory"),
            ("TSKV_STORE_PATH", "/var/lib/tskv.db"),
        ]
        .into_iter()
        .collect();

        let mut config = TelemetryConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.ingest.default_ttl_seconds, 90);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.path, Path::new("/var/lib/tskv.db"));
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let mut config = TelemetryConfig::default();
        config.apply_overrides(|name| match name {
            "TSKV_DEFAULT_TTL_SECONDS" => Some("soon".to_string()),
            "TSKV_STORE_BACKEND" => Some("postgres".to_string()),
            _ => None,
        });

        assert_eq!(config.ingest.default_ttl_seconds, 0);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\ndefault_ttl_seconds = 5").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ingest.default_ttl_seconds, 5);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/tskv.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
