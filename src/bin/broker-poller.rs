//! # Broker Poller
//!
//! Runs the broker event poller with an event queue that logs every event
//! and the transport factory for the configured mode. Configuration comes
//! from `config/wabroker*.toml` and `WABROKER__*` environment variables.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use wabroker_core::broker::HttpBrokerClient;
use wabroker_core::config::{ConfigManager, SharedRuntimeSettings};
use wabroker_core::events::{BrokerEvent, EventQueue, LegacySignal, SubscriptionKey};
use wabroker_core::logging::init_structured_logging;
use wabroker_core::poller::{CursorStore, EventPoller, InMemoryCursorStore, JsonFileCursorStore};
use wabroker_core::transport::{
    InMemorySidecarManager, TransportDependencies, TransportFactory, WhatsAppTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config();
    info!(
        environment = %manager.environment(),
        config = %manager.debug_config(),
        "Broker poller configuration"
    );

    let runtime = Arc::new(SharedRuntimeSettings::from_config(config));
    let client = Arc::new(
        HttpBrokerClient::new(config.broker.clone()).context("creating broker client")?,
    );

    let store: Arc<dyn CursorStore> = match &config.poller.cursor_store_path {
        Some(path) => {
            info!(path = %path, "Using JSON file cursor store");
            Arc::new(JsonFileCursorStore::new(PathBuf::from(path)))
        }
        None => {
            warn!("No cursor_store_path configured, cursor will not survive restarts");
            Arc::new(InMemoryCursorStore::new())
        }
    };

    let queue = Arc::new(EventQueue::with_legacy_signal(LegacySignal::new(
        config.events.legacy_channel_capacity,
    )));
    queue.subscribe_fn(SubscriptionKey::Wildcard, |event: BrokerEvent| async move {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            instance_id = ?event.instance_id,
            cursor = ?event.cursor,
            "Broker event received"
        );
        Ok(())
    });

    let factory = TransportFactory::new(
        runtime.clone(),
        TransportDependencies::default()
            .with_broker_api(client.clone())
            .with_sidecar_manager(Arc::new(InMemorySidecarManager::new())),
    );
    match factory.resolve() {
        Ok(transport) => info!(transport = %transport.name(), "Outbound transport ready"),
        Err(e) => warn!(error = %e, "Outbound transport unavailable"),
    }

    let poller = EventPoller::new(client, store, queue.clone(), runtime, &config.poller);
    if !poller.start().await {
        warn!("Poller is inactive for the current settings; waiting for shutdown");
    }

    info!("Broker poller running... Press Ctrl+C to shutdown gracefully");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Error listening for Ctrl+C");
            }
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        result = wait_for_sigterm() => {
            match result {
                Ok(()) => info!("Received SIGTERM, initiating graceful shutdown..."),
                Err(e) => warn!(error = %e, "Error setting up SIGTERM handler"),
            }
        }
    }

    poller.stop().await;
    queue.wait_idle().await;
    info!(stats = ?queue.stats(), "Broker poller shutdown complete");

    Ok(())
}

/// Wait for SIGTERM signal (for container deployments)
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
