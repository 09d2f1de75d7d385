use crate::kv::Ttl;
use serde::{Deserialize, Serialize};

/// Configuration for the ingestion coordinator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// TTL applied when a caller does not pass one (0 = keep forever)
    #[serde(default)]
    pub default_ttl_seconds: u64,
}

impl IngestConfig {
    pub fn default_ttl(&self) -> Ttl {
        Ttl::from_secs(self.default_ttl_seconds)
    }
}
