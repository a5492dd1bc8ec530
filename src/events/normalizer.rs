//! # Event Normalizer
//!
//! Pure functions turning whatever the broker hands us into [`BrokerEvent`]s.
//!
//! The broker has changed its payload shape more than once, so nothing here
//! trusts the input: identifiers may arrive as strings, numbers or nested
//! objects, cursors may be wrapped in `{cursor}`, `{token}` or `{value}`
//! objects, and the event itself may sit at the top level, under `event`, or
//! under `payload`. Inputs that cannot be turned into a valid event yield
//! `None`; nothing in this module panics or returns an error.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::types::{BrokerEvent, BrokerEventType, CursorState, NormalizedEnvelope};
use crate::constants::{MAX_SEARCH_DEPTH, NESTED_ACK_ID_KEYS, NESTED_CURSOR_KEYS};

/// Schema enforced on `MESSAGE_INBOUND` events
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundEventSchema {
    #[serde(default, alias = "instance_id")]
    instance_id: Option<String>,
    #[serde(default)]
    timestamp: Option<TimestampField>,
    #[serde(default)]
    cursor: Option<Value>,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default, alias = "tenant_id")]
    tenant_id: Option<String>,
    #[serde(default, alias = "session_id")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampField {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl TimestampField {
    fn into_string(self) -> String {
        match self {
            TimestampField::Text(s) => s,
            TimestampField::Integer(i) => i.to_string(),
            TimestampField::Float(f) => f.to_string(),
        }
    }
}

/// Normalize a single event object
///
/// Requires a non-blank `id` (trimmed) and a `type` matching one of the known
/// event types case-insensitively; anything else yields `None`.
pub fn normalize_event(input: &Value) -> Option<BrokerEvent> {
    let obj = input.as_object()?;

    let id = scalar_string(obj.get("id")?)?;
    let event_type = obj
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<BrokerEventType>().ok())?;

    if event_type == BrokerEventType::MessageInbound {
        match InboundEventSchema::deserialize(input) {
            Ok(schema) => {
                return Some(BrokerEvent {
                    id,
                    event_type,
                    payload: Value::Object(schema.payload.unwrap_or_default()),
                    tenant_id: schema.tenant_id,
                    session_id: schema.session_id,
                    instance_id: Some(schema.instance_id.unwrap_or_default()),
                    timestamp: schema.timestamp.map(TimestampField::into_string),
                    cursor: schema.cursor.as_ref().and_then(extract_cursor_value),
                });
            }
            Err(e) => {
                warn!(
                    event_id = %id,
                    error = %e,
                    "Inbound event failed schema validation, falling back to raw fields"
                );
            }
        }
    }

    Some(best_effort_event(id, event_type, obj))
}

fn best_effort_event(id: String, event_type: BrokerEventType, obj: &Map<String, Value>) -> BrokerEvent {
    BrokerEvent {
        id,
        event_type,
        payload: obj.get("payload").cloned().unwrap_or(Value::Null),
        tenant_id: string_field(obj, &["tenantId", "tenant_id"]),
        session_id: string_field(obj, &["sessionId", "session_id"]),
        instance_id: string_field(obj, &["instanceId", "instance_id"]),
        timestamp: string_field(obj, &["timestamp"]),
        cursor: obj.get("cursor").and_then(extract_cursor_value),
    }
}

/// Normalize a raw broker envelope and the event it carries
///
/// The envelope's ack id, cursor and session id back-fill the inner event
/// when it lacks its own.
pub fn normalize_envelope(raw: &Value) -> Option<NormalizedEnvelope> {
    let obj = raw.as_object()?;

    let ack_id = obj.get("id").and_then(extract_ack_id);
    let cursor = obj.get("cursor").and_then(extract_cursor_value);
    let instance_id = string_field(obj, &["instanceId", "instance_id"]);
    let session_id = string_field(obj, &["sessionId", "session_id"]);

    let mut inner = inner_event_object(obj);

    if inner.get("id").and_then(scalar_string).is_none() {
        if let Some(ack_id) = &ack_id {
            inner.insert("id".to_string(), Value::String(ack_id.clone()));
        }
    }
    if inner.get("cursor").and_then(extract_cursor_value).is_none() {
        if let Some(cursor) = &cursor {
            inner.insert("cursor".to_string(), Value::String(cursor.clone()));
        }
    }
    if string_field(&inner, &["sessionId", "session_id"]).is_none() {
        if let Some(session_id) = &session_id {
            inner.insert("sessionId".to_string(), Value::String(session_id.clone()));
        }
    }

    let event = normalize_event(&Value::Object(inner))?;
    let instance_id = instance_id.or_else(|| {
        event
            .instance_id
            .clone()
            .filter(|instance| !instance.is_empty())
    });

    Some(NormalizedEnvelope {
        ack_id,
        cursor,
        instance_id,
        event,
    })
}

/// Locate the object holding the event fields
///
/// An envelope with a recognizable `type` is the event itself; its `payload`
/// may carry an unrelated message `type` of its own.
fn inner_event_object(envelope: &Map<String, Value>) -> Map<String, Value> {
    let typed = envelope
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.parse::<BrokerEventType>().is_ok());
    if typed {
        return envelope.clone();
    }
    if let Some(Value::Object(event)) = envelope.get("event") {
        return event.clone();
    }
    if let Some(Value::Object(payload)) = envelope.get("payload") {
        if payload.contains_key("type") {
            return payload.clone();
        }
    }
    envelope.clone()
}

/// Parse a persisted cursor value
///
/// Accepts an object, a JSON document in a string, or a plain string token
/// which is taken as the cursor itself.
pub fn normalize_cursor_state(value: &Value) -> CursorState {
    match value {
        Value::Object(obj) => CursorState {
            cursor: obj.get("cursor").and_then(extract_cursor_value),
            instance_id: string_field(obj, &["instanceId", "instance_id"]),
        },
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return CursorState::default();
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed @ Value::Object(_)) => normalize_cursor_state(&parsed),
                Ok(Value::String(inner)) => normalize_cursor_state(&Value::String(inner)),
                _ => CursorState::new(trimmed),
            }
        }
        Value::Number(n) => CursorState::new(n.to_string()),
        _ => CursorState::default(),
    }
}

/// Extract a cursor token from a string, number, or nested cursor object
pub fn extract_cursor_value(value: &Value) -> Option<String> {
    extract_nested(value, NESTED_CURSOR_KEYS, 0)
}

/// Extract an acknowledgement id from a string, number, or nested id object
pub fn extract_ack_id(value: &Value) -> Option<String> {
    extract_nested(value, NESTED_ACK_ID_KEYS, 0)
}

fn extract_nested(value: &Value, keys: &[&str], depth: usize) -> Option<String> {
    match value {
        Value::Object(obj) if depth < MAX_SEARCH_DEPTH => keys
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(|nested| extract_nested(nested, keys, depth + 1)),
        other => scalar_string(other),
    }
}

/// Trimmed, non-empty string form of a string or number
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First usable scalar among `keys`
pub(crate) fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(scalar_string)
}
