//! Canonical event model produced by the normalizer and consumed by the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Known broker event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerEventType {
    MessageInbound,
    MessageOutbound,
    PollChoice,
}

impl BrokerEventType {
    pub const ALL: [BrokerEventType; 3] = [
        BrokerEventType::MessageInbound,
        BrokerEventType::MessageOutbound,
        BrokerEventType::PollChoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerEventType::MessageInbound => "MESSAGE_INBOUND",
            BrokerEventType::MessageOutbound => "MESSAGE_OUTBOUND",
            BrokerEventType::PollChoice => "POLL_CHOICE",
        }
    }
}

impl fmt::Display for BrokerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses case-insensitively, ignoring surrounding whitespace
impl FromStr for BrokerEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| format!("Unknown broker event type: {s}"))
    }
}

/// A normalized broker event
///
/// `id` is never blank and `event_type` is always one of the known types;
/// the normalizer refuses to build anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: BrokerEventType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl BrokerEvent {
    /// Create a bare event with a null payload
    pub fn new(id: impl Into<String>, event_type: BrokerEventType) -> Self {
        Self {
            id: id.into(),
            event_type,
            payload: Value::Null,
            tenant_id: None,
            session_id: None,
            instance_id: None,
            timestamp: None,
            cursor: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

/// Raw broker envelope after normalization, wrapping the inner event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEnvelope {
    pub ack_id: Option<String>,
    pub cursor: Option<String>,
    pub instance_id: Option<String>,
    pub event: BrokerEvent,
}

/// Persisted poller position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl CursorState {
    pub fn new(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            instance_id: None,
        }
    }
}
