use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_executor_ttl_secs")]
    pub executor_ttl_secs: u64,
    #[serde(default = "default_script_history_limit")]
    pub script_history_limit: usize,
    /// Persist each record's index keys at insert and use them on delete,
    /// instead of re-deriving them from the job's current group.
    #[serde(default)]
    pub snapshot_index_keys: bool,
}

fn default_namespace() -> String {
    "jobmesh".to_string()
}

fn default_discovery_timeout_secs() -> u64 {
    10
}

fn default_executor_ttl_secs() -> u64 {
    60
}

fn default_script_history_limit() -> usize {
    20
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            executor_ttl_secs: default_executor_ttl_secs(),
            script_history_limit: default_script_history_limit(),
            snapshot_index_keys: false,
        }
    }
}

impl StoreConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn executor_ttl(&self) -> Duration {
        Duration::from_secs(self.executor_ttl_secs)
    }
}
