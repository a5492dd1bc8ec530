//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod strategies;

pub use fakes::*;

use std::sync::Arc;
use std::time::Duration;

use wabroker_core::config::{PollerConfig, RuntimeSettings, SharedRuntimeSettings, TransportMode};

/// Poller config with delays short enough for tests
pub fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        success_delay_ms: 10,
        idle_delay_ms: 20,
        backoff_base_ms: 10,
        backoff_max_ms: 40,
        backoff_max_exponent: 5,
        ..PollerConfig::default()
    }
}

pub fn runtime(mode: TransportMode) -> Arc<SharedRuntimeSettings> {
    Arc::new(SharedRuntimeSettings::new(RuntimeSettings {
        poller_disabled: false,
        transport_mode: mode,
    }))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
