//! # Broker Module
//!
//! Client side of the remote WhatsApp broker: the event fetch endpoint the
//! poller pulls from and the messaging API the HTTP transport sends through.

pub mod client;
pub mod errors;

pub use client::{BrokerEventSource, BrokerMessagingApi, HttpBrokerClient};
pub use errors::{BrokerClientError, BrokerClientResult};
