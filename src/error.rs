//! # Crate Error Types
//!
//! Top-level error enum for the ingestion side of the broker core. Transport
//! calls surface [`CanonicalError`] directly; everything the poller, queue and
//! configuration layers can fail with funnels into [`BrokerError`].

use crate::broker::BrokerClientError;
use crate::transport::CanonicalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Broker fetch failed: {0}")]
    Fetch(#[from] BrokerClientError),

    #[error("Cursor store error: {operation}: {message}")]
    CursorStore { operation: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Event queue error: {message}")]
    Queue { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] CanonicalError),

    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl BrokerError {
    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a cursor store error
    pub fn cursor_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CursorStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<::config::ConfigError> for BrokerError {
    fn from(err: ::config::ConfigError) -> Self {
        BrokerError::configuration("config", err.to_string())
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
