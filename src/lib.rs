#![allow(clippy::doc_markdown)] // Allow technical terms like WhatsApp, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # WhatsApp Broker Core
//!
//! Event ingestion and outbound transport core for a WhatsApp message broker.
//!
//! ## Overview
//!
//! The broker is a pull-based, best-effort source whose payload conventions
//! have shifted between versions. This crate pulls its events, normalizes
//! them into one canonical model, dispatches them in order to in-process
//! handlers, and hides outbound delivery behind a single transport interface
//! with one error shape.
//!
//! ## Architecture
//!
//! ```text
//! EventPoller ──fetch(cursor)──▶ broker
//!     │ extract candidates → normalize → enqueue → persist ack cursor
//!     ▼
//! EventQueue ──serialized dispatch──▶ handlers (per type, then wildcard)
//!     └─ no handler ─▶ LegacySignal
//!
//! TransportFactory ──live mode──▶ Http | Sidecar | DryRun   (Disabled → error)
//! ```
//!
//! ## Module Organization
//!
//! - [`events`] - Canonical event model, normalizer and ordered event queue
//! - [`poller`] - Broker polling loop, cursor persistence and backoff
//! - [`broker`] - HTTP client for the remote broker
//! - [`transport`] - Outbound transports, factory and canonical errors
//! - [`config`] - Static configuration loading and live runtime settings
//! - [`error`] - Crate-level error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wabroker_core::broker::HttpBrokerClient;
//! use wabroker_core::config::{ConfigManager, SharedRuntimeSettings};
//! use wabroker_core::events::{BrokerEvent, EventQueue, SubscriptionKey};
//! use wabroker_core::poller::{EventPoller, InMemoryCursorStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let queue = Arc::new(EventQueue::new());
//! queue.subscribe_fn(SubscriptionKey::Wildcard, |event: BrokerEvent| async move {
//!     println!("{} {}", event.event_type, event.id);
//!     Ok(())
//! });
//!
//! let poller = EventPoller::new(
//!     Arc::new(HttpBrokerClient::new(config.broker.clone())?),
//!     Arc::new(InMemoryCursorStore::new()),
//!     Arc::clone(&queue),
//!     Arc::new(SharedRuntimeSettings::from_config(config)),
//!     &config.poller,
//! );
//! poller.start().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod poller;
pub mod transport;

pub use config::{BrokerConfig, ConfigManager, RuntimeSettings, SharedRuntimeSettings, TransportMode};
pub use error::{BrokerError, BrokerResult};
pub use events::{BrokerEvent, BrokerEventType, EventQueue, NormalizedEnvelope};
pub use poller::{EventPoller, PollerMetrics};
pub use transport::{ActiveTransport, CanonicalError, ErrorCode, TransportFactory, WhatsAppTransport};
