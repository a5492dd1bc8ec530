//! # Configuration Loader
//!
//! Sources are layered, later ones winning:
//!
//! 1. built-in defaults
//! 2. `wabroker.toml` in the config directory (optional)
//! 3. `wabroker.{environment}.toml` in the config directory (optional)
//! 4. `WABROKER__*` environment variables, e.g. `WABROKER__POLLER__IDLE_DELAY_MS=2000`
//!
//! The config directory is `WABROKER_CONFIG_DIR`, else `./config`.

use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::BrokerConfig;
use crate::error::BrokerResult;
use crate::logging::detect_environment;

const CONFIG_FILE_STEM: &str = "wabroker";
const ENV_PREFIX: &str = "WABROKER";
const CONFIG_DIR_VAR: &str = "WABROKER_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config";

/// Validated configuration and the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: BrokerConfig,
    environment: String,
    source_dir: Option<PathBuf>,
}

impl ConfigManager {
    /// Load for the detected environment from the default config directory
    pub fn load() -> BrokerResult<Arc<ConfigManager>> {
        let dir = env::var(CONFIG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR));
        Self::load_from(&dir, &detect_environment())
    }

    /// Load from `dir` for an explicit environment name
    pub fn load_from(dir: &Path, environment: &str) -> BrokerResult<Arc<ConfigManager>> {
        debug!(environment = %environment, dir = %dir.display(), "Loading broker configuration");

        let config = layered(dir, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            transport_mode = %config.transport.mode,
            poller_disabled = config.poller.disabled,
            broker_url = %config.broker.base_url,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_dir: Some(dir.to_path_buf()),
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: BrokerConfig, environment: &str) -> BrokerResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_dir: None,
        }))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the files were read from; `None` for [`ConfigManager::from_config`]
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    /// Configuration as JSON with the broker API key masked
    pub fn debug_config(&self) -> Value {
        let mut json = serde_json::to_value(&self.config).unwrap_or(Value::Null);
        if let Some(key) = json.pointer_mut("/broker/api_key") {
            let masked = if key.as_str().is_some_and(str::is_empty) {
                "[EMPTY]"
            } else {
                "[MASKED]"
            };
            *key = Value::String(masked.to_string());
        }
        json
    }
}

fn layered(dir: &Path, environment: &str) -> BrokerResult<BrokerConfig> {
    let base_file = dir.join(format!("{CONFIG_FILE_STEM}.toml"));
    let env_file = dir.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

    let settings = ::config::Config::builder()
        .add_source(::config::Config::try_from(&BrokerConfig::default())?)
        .add_source(::config::File::from(base_file).required(false))
        .add_source(::config::File::from(env_file).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize::<BrokerConfig>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;
    use std::fs;

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load_from(dir.path(), "test").unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.source_dir(), Some(dir.path()));
        assert_eq!(manager.config().poller.success_delay_ms, 500);
        assert_eq!(manager.config().transport.mode, TransportMode::Http);
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("wabroker.toml"),
            "[poller]\nidle_delay_ms = 9000\nsuccess_delay_ms = 100\n\n[transport]\nmode = \"sidecar\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("wabroker.test.toml"),
            "[poller]\nidle_delay_ms = 1200\n\n[transport]\nmode = \"dry-run\"\n",
        )
        .unwrap();

        let manager = ConfigManager::load_from(dir.path(), "test").unwrap();
        let config = manager.config();
        assert_eq!(config.poller.idle_delay_ms, 1200);
        assert_eq!(config.poller.success_delay_ms, 100);
        assert_eq!(config.transport.mode, TransportMode::DryRun);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wabroker.toml"), "[poller]\nsuccess_delay_ms = 0\n").unwrap();
        assert!(ConfigManager::load_from(dir.path(), "test").is_err());
    }

    #[test]
    fn test_debug_config_masks_api_key() {
        let mut config = BrokerConfig::default();
        config.broker.api_key = "super-secret".to_string();
        let manager = ConfigManager::from_config(config, "test").unwrap();
        let json = manager.debug_config();
        assert_eq!(json["broker"]["api_key"], "[MASKED]");
        assert_eq!(json["broker"]["api_key_header"], "X-API-Key");

        let manager = ConfigManager::from_config(BrokerConfig::default(), "test").unwrap();
        assert_eq!(manager.debug_config()["broker"]["api_key"], "[EMPTY]");
    }
}
