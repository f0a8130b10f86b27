use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::StoreConfig;

/// Environment variable naming a directory that holds `config.json`.
pub const CONFIG_DIR_ENV: &str = "JOBMESH_CONFIG_DIR";

const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "job-mesh-store";

/// Load the StoreConfig. Resolution order:
///   1. `config_path`, if given (missing file is an error)
///   2. `$JOBMESH_CONFIG_DIR/config.json`
///   3. platform config dir (`dirs::config_dir()/job-mesh-store/config.json`)
///   4. `StoreConfig::default()`
pub fn load_config(config_path: Option<&Path>) -> Result<StoreConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return read_config(path);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
        let path = PathBuf::from(&config_dir).join(CONFIG_FILE);
        if path.exists() {
            return read_config(&path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_DIR).join(CONFIG_FILE);
        if path.exists() {
            return read_config(&path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(StoreConfig::default())
}

fn read_config(path: &Path) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: StoreConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_path() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("custom.json");
        std::fs::write(&path, r#"{"namespace": "custom", "script_history_limit": 7}"#)
            .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.namespace, "custom");
        assert_eq!(config.script_history_limit, 7);
        assert_eq!(config.discovery_timeout_secs, 10);
    }

    #[test]
    fn test_load_missing_explicit_path_is_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let result = load_config(Some(&tmp.path().join("absent.json")));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {}", err);
    }

    #[test]
    fn test_load_from_config_dir_env() {
        let tmp = TempDir::new().expect("create temp dir");
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"{"namespace": "from-env", "executor_ttl_secs": 30}"#,
        )
        .expect("write config");

        std::env::set_var(CONFIG_DIR_ENV, tmp.path());
        let result = load_config(None);
        std::env::remove_var(CONFIG_DIR_ENV);

        let config = result.expect("load");
        assert_eq!(config.namespace, "from-env");
        assert_eq!(config.executor_ttl_secs, 30);
        assert_eq!(config.script_history_limit, 20);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write config");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "got: {}", err);
    }
}
