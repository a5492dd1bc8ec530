//! # Broker Core Configuration
//!
//! Two kinds of configuration live here:
//!
//! - **Static configuration** ([`BrokerConfig`]), loaded once at startup by
//!   [`ConfigManager`] from defaults, optional TOML files and `WABROKER__*`
//!   environment variables.
//! - **Live runtime settings** ([`RuntimeSettings`]), the poller-disabled flag
//!   and the active transport mode. These are read through a
//!   [`RuntimeSettingsSource`] on every poller iteration and every transport
//!   resolution, so flipping them at runtime takes effect without a restart.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wabroker_core::config::{ConfigManager, SharedRuntimeSettings, TransportMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let runtime = SharedRuntimeSettings::from_config(manager.config());
//!
//! // Later, e.g. from an admin endpoint
//! runtime.set_transport_mode(TransportMode::DryRun);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::defaults;
use crate::error::{BrokerError, BrokerResult};

pub use loader::ConfigManager;

/// Active outbound delivery backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportMode {
    #[default]
    Http,
    Sidecar,
    DryRun,
    Disabled,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Http => "http",
            TransportMode::Sidecar => "sidecar",
            TransportMode::DryRun => "dryrun",
            TransportMode::Disabled => "disabled",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" | "broker" => Ok(TransportMode::Http),
            "sidecar" | "baileys" | "embedded" => Ok(TransportMode::Sidecar),
            "dryrun" | "dry-run" | "dry_run" | "stub" => Ok(TransportMode::DryRun),
            "disabled" | "off" | "none" => Ok(TransportMode::Disabled),
            other => Err(BrokerError::configuration(
                "transport.mode",
                format!("Unknown transport mode '{other}'"),
            )),
        }
    }
}

impl Serialize for TransportMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransportMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Remote broker API
    pub broker: BrokerApiConfig,
    /// Event poller timings
    pub poller: PollerConfig,
    /// Outbound transport selection
    pub transport: TransportConfig,
    /// Event queue settings
    pub events: EventsConfig,
}

impl BrokerConfig {
    /// Validate cross-field invariants
    pub fn validate(&self) -> BrokerResult<()> {
        self.poller.validate()?;
        if self.transport.mode == TransportMode::Http || !self.poller.disabled {
            self.broker.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_key_header: String,
    pub timeout_ms: u64,
    pub events_path: String,
}

impl Default for BrokerApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            api_key_header: "X-API-Key".to_string(),
            timeout_ms: defaults::BROKER_TIMEOUT_MS,
            events_path: "/broker/events".to_string(),
        }
    }
}

impl BrokerApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> BrokerResult<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(BrokerError::configuration(
                "broker.base_url",
                "must not be empty",
            ));
        }
        reqwest::Url::parse(base).map_err(|e| {
            BrokerError::configuration("broker.base_url", format!("Invalid URL '{base}': {e}"))
        })?;
        if self.timeout_ms == 0 {
            return Err(BrokerError::configuration(
                "broker.timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Poller timings and behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Start-up value of the live poller-disabled flag
    pub disabled: bool,
    /// Delay after a cycle that found events or reported more pending
    pub success_delay_ms: u64,
    /// Delay after an empty cycle
    pub idle_delay_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Doublings after which the backoff stops growing
    pub backoff_max_exponent: u32,
    /// Wait for dispatch to settle before persisting the ack cursor
    pub ack_after_dispatch: bool,
    /// JSON file for the cursor; in-memory when unset
    pub cursor_store_path: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            success_delay_ms: defaults::SUCCESS_DELAY_MS,
            idle_delay_ms: defaults::IDLE_DELAY_MS,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
            backoff_max_exponent: defaults::BACKOFF_MAX_EXPONENT,
            ack_after_dispatch: false,
            cursor_store_path: None,
        }
    }
}

impl PollerConfig {
    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if self.success_delay_ms == 0 || self.idle_delay_ms == 0 {
            return Err(BrokerError::configuration(
                "poller",
                "success_delay_ms and idle_delay_ms must be greater than zero",
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(BrokerError::configuration(
                "poller.backoff_base_ms",
                "must be greater than zero",
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(BrokerError::configuration(
                "poller",
                format!(
                    "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                    self.backoff_base_ms, self.backoff_max_ms
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Start-up value of the live transport mode
    pub mode: TransportMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub legacy_channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            legacy_channel_capacity: defaults::LEGACY_CHANNEL_CAPACITY,
        }
    }
}

/// Settings that may change while the process runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub poller_disabled: bool,
    pub transport_mode: TransportMode,
}

impl RuntimeSettings {
    /// The poller only runs against the HTTP broker
    pub fn poller_should_run(&self) -> bool {
        !self.poller_disabled && self.transport_mode == TransportMode::Http
    }
}

/// Live view of [`RuntimeSettings`]
pub trait RuntimeSettingsSource: Send + Sync {
    fn current(&self) -> RuntimeSettings;
}

/// Process-wide mutable runtime settings
#[derive(Debug, Default)]
pub struct SharedRuntimeSettings {
    inner: RwLock<RuntimeSettings>,
}

impl SharedRuntimeSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(RuntimeSettings {
            poller_disabled: config.poller.disabled,
            transport_mode: config.transport.mode,
        })
    }

    pub fn set_transport_mode(&self, mode: TransportMode) {
        self.inner.write().transport_mode = mode;
    }

    pub fn set_poller_disabled(&self, disabled: bool) {
        self.inner.write().poller_disabled = disabled;
    }
}

impl RuntimeSettingsSource for SharedRuntimeSettings {
    fn current(&self) -> RuntimeSettings {
        *self.inner.read()
    }
}
