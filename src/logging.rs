//! # Structured Logging Module
//!
//! Environment-aware structured logging for the poller loop, the event queue
//! and outbound transports.

use chrono::Utc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::transport::TransportName;

static LOGGING: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once per process
///
/// `RUST_LOG` wins over the environment default. Set
/// `WABROKER_LOG_FORMAT=json` for one JSON object per line.
pub fn init_structured_logging() {
    LOGGING.get_or_init(|| {
        let environment = detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(&environment)));
        let json = std::env::var("WABROKER_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // the host process may own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Tracing subscriber already installed, keeping it");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// WABROKER_ENV, then APP_ENV, then `development`
pub(crate) fn detect_environment() -> String {
    std::env::var("WABROKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|name| name.trim().to_lowercase())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "development".to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log one completed poller cycle
pub fn log_poller_cycle(
    poller_id: &str,
    cursor: Option<&str>,
    fetched: usize,
    normalized: usize,
    persisted: bool,
    next_delay: Duration,
) {
    tracing::debug!(
        poller_id = %poller_id,
        cursor = cursor,
        fetched = fetched,
        normalized = normalized,
        persisted = persisted,
        next_delay_ms = next_delay.as_millis() as u64,
        timestamp = %Utc::now().to_rfc3339(),
        "POLLER_CYCLE"
    );
}

/// Log structured data for transport operations
pub fn log_transport_operation(
    transport: TransportName,
    operation: &str,
    instance_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        transport = %transport,
        operation = %operation,
        instance_id = %instance_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TRANSPORT_OPERATION"
    );
}

/// Log structured data for queue operations
pub fn log_queue_operation(operation: &str, subscription: Option<&str>, pending: usize, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        subscription = subscription,
        pending = pending,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "QUEUE_OPERATION"
    );
}
