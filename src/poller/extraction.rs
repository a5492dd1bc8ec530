//! # Fetch Response Extraction
//!
//! Pulls event candidates, the acknowledgement cursor and the has-more signal
//! out of a broker fetch response.
//!
//! Each lookup is an ordered list of pure strategies tried first-match-wins.
//! The key names they search come from [`crate::constants`]; when a key is
//! missing at the top level the search descends into pagination-like
//! containers (`pagination`, `pageInfo`, `meta`, ...).

use serde_json::Value;

use crate::constants::{
    ACK_CURSOR_KEYS, CANDIDATE_ARRAY_KEYS, FALSY_TOKENS, HAS_MORE_KEYS, MAX_SEARCH_DEPTH,
    NEXT_CURSOR_KEYS, PAGINATION_CONTAINER_KEYS, TRUTHY_TOKENS,
};
use crate::events::normalizer::extract_cursor_value;
use crate::events::NormalizedEnvelope;

/// A single extraction step over the raw response
pub type Strategy<T> = fn(&Value) -> Option<T>;

/// Candidate shapes, most specific first
pub const CANDIDATE_STRATEGIES: &[Strategy<Vec<Value>>] =
    &[top_level_array, named_candidate_array, single_event_object];

/// Envelope-level cursor lookups, ack cursor before next-page cursor
///
/// Every top-level key is tried before any pagination container is entered.
pub const ENVELOPE_CURSOR_STRATEGIES: &[Strategy<String>] =
    &[ack_cursor, next_cursor, nested_envelope_cursor];

const ENVELOPE_CURSOR_KEYS: &[&[&str]] = &[ACK_CURSOR_KEYS, NEXT_CURSOR_KEYS];

fn first_match<T>(payload: &Value, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(payload))
}

/// Event candidates carried by a fetch response; empty when none are found
pub fn extract_candidates(payload: &Value) -> Vec<Value> {
    first_match(payload, CANDIDATE_STRATEGIES).unwrap_or_default()
}

fn top_level_array(payload: &Value) -> Option<Vec<Value>> {
    payload.as_array().cloned()
}

fn named_candidate_array(payload: &Value) -> Option<Vec<Value>> {
    let obj = payload.as_object()?;
    CANDIDATE_ARRAY_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|value| value.as_array().cloned())
}

/// The response itself is one event or envelope
fn single_event_object(payload: &Value) -> Option<Vec<Value>> {
    let obj = payload.as_object()?;
    let looks_like_event = obj.contains_key("type")
        || obj.get("event").is_some_and(Value::is_object)
        || (obj.contains_key("id") && obj.contains_key("payload"));
    looks_like_event.then(|| vec![payload.clone()])
}

/// Cursor to acknowledge after a cycle
///
/// Prefers the last normalized event's own cursor, then an envelope-level
/// ack cursor, then the next-page cursor.
pub fn resolve_ack_cursor(events: &[NormalizedEnvelope], payload: &Value) -> Option<String> {
    last_event_cursor(events).or_else(|| envelope_cursor(payload))
}

/// Envelope-level cursor only, ignoring events
pub fn envelope_cursor(payload: &Value) -> Option<String> {
    first_match(payload, ENVELOPE_CURSOR_STRATEGIES)
}

fn last_event_cursor(events: &[NormalizedEnvelope]) -> Option<String> {
    let last = events.last()?;
    last.event.cursor.clone().or_else(|| last.cursor.clone())
}

fn ack_cursor(payload: &Value) -> Option<String> {
    top_level(payload, ACK_CURSOR_KEYS, extract_cursor_value)
}

fn next_cursor(payload: &Value) -> Option<String> {
    top_level(payload, NEXT_CURSOR_KEYS, extract_cursor_value)
}

fn nested_envelope_cursor(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;
    PAGINATION_CONTAINER_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|nested| search_keys(nested, ENVELOPE_CURSOR_KEYS, extract_cursor_value, 1))
}

/// Whether the broker reported more events pending; false when it did not say
pub fn resolve_has_more(payload: &Value) -> bool {
    search_keys(payload, &[HAS_MORE_KEYS], coerce_bool, 0).unwrap_or(false)
}

fn top_level<T>(value: &Value, keys: &[&str], coerce: fn(&Value) -> Option<T>) -> Option<T> {
    let obj = value.as_object()?;
    keys.iter().filter_map(|key| obj.get(*key)).find_map(coerce)
}

/// Try each key group in order at this level, then descend into pagination containers
fn search_keys<T>(
    value: &Value,
    groups: &[&[&str]],
    coerce: fn(&Value) -> Option<T>,
    depth: usize,
) -> Option<T> {
    if let Some(found) = groups.iter().find_map(|keys| top_level(value, keys, coerce)) {
        return Some(found);
    }
    if depth >= MAX_SEARCH_DEPTH {
        return None;
    }
    let obj = value.as_object()?;
    PAGINATION_CONTAINER_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|nested| search_keys(nested, groups, coerce, depth + 1))
}

/// Loose boolean coercion used for has-more flags
///
/// Numbers are true when non-zero. Strings match the truthy and falsy token
/// lists case-insensitively, or parse as finite numbers. Anything else is
/// undecided.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if TRUTHY_TOKENS.contains(&token.as_str()) {
                Some(true)
            } else if FALSY_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                token
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v != 0.0)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::normalize_envelope;
    use serde_json::json;

    #[test]
    fn test_candidates_from_top_level_array() {
        let payload = json!([{"id": "a"}, {"id": "b"}]);
        assert_eq!(extract_candidates(&payload).len(), 2);
    }

    #[test]
    fn test_candidates_follow_key_priority() {
        let payload = json!({"data": [{"id": "from-data"}], "events": [{"id": "from-events"}]});
        let candidates = extract_candidates(&payload);
        assert_eq!(candidates, vec![json!({"id": "from-events"})]);

        // non-array values under a candidate key are skipped
        let payload = json!({"events": {"id": "x"}, "items": [{"id": "i1"}]});
        assert_eq!(extract_candidates(&payload), vec![json!({"id": "i1"})]);
    }

    #[test]
    fn test_single_event_is_wrapped() {
        let payload = json!({"id": "solo", "type": "POLL_CHOICE"});
        assert_eq!(extract_candidates(&payload), vec![payload.clone()]);

        let envelope = json!({"id": 7, "event": {"type": "MESSAGE_INBOUND"}});
        assert_eq!(extract_candidates(&envelope).len(), 1);
    }

    #[test]
    fn test_no_candidates() {
        assert!(extract_candidates(&json!({})).is_empty());
        assert!(extract_candidates(&json!({"nextCursor": "c1"})).is_empty());
        assert!(extract_candidates(&json!("text")).is_empty());
    }

    #[test]
    fn test_ack_cursor_prefers_last_event() {
        let payload = json!({
            "events": [
                {"id": "e1", "type": "POLL_CHOICE", "cursor": "c-e1"},
                {"id": "e2", "type": "POLL_CHOICE", "cursor": "c-e2"}
            ],
            "nextCursor": "c-next"
        });
        let events: Vec<_> = extract_candidates(&payload)
            .iter()
            .filter_map(normalize_envelope)
            .collect();
        assert_eq!(resolve_ack_cursor(&events, &payload).as_deref(), Some("c-e2"));
        assert_eq!(resolve_ack_cursor(&[], &payload).as_deref(), Some("c-next"));
    }

    #[test]
    fn test_ack_cursor_searches_pagination_containers() {
        let payload = json!({"events": [], "meta": {"pagination": {"ack": {"token": "deep"}}}});
        assert_eq!(envelope_cursor(&payload).as_deref(), Some("deep"));

        let payload = json!({"pageInfo": {"lastAckCursor": 42}});
        assert_eq!(envelope_cursor(&payload).as_deref(), Some("42"));
    }

    #[test]
    fn test_top_level_cursor_beats_nested_ack_cursor() {
        let payload = json!({"nextCursor": "c2", "meta": {"cursor": "old"}});
        assert_eq!(envelope_cursor(&payload).as_deref(), Some("c2"));

        let payload = json!({"pageInfo": {"lastAckCursor": 42}, "nextCursor": "c9"});
        assert_eq!(envelope_cursor(&payload).as_deref(), Some("c9"));

        // within one container the ack cursor still wins
        let payload = json!({"meta": {"next": "n1", "ack": "a1"}});
        assert_eq!(envelope_cursor(&payload).as_deref(), Some("a1"));
    }

    #[test]
    fn test_has_more_coercion() {
        assert!(resolve_has_more(&json!({"hasMore": true})));
        assert!(resolve_has_more(&json!({"remaining": 3})));
        assert!(resolve_has_more(&json!({"pagination": {"has_next": "Yes"}})));
        assert!(!resolve_has_more(&json!({"more": "none"})));
        assert!(!resolve_has_more(&json!({"pending": 0})));
        assert!(!resolve_has_more(&json!({})));
        // an undecidable value does not stop the search
        assert!(resolve_has_more(&json!({"hasMore": null, "more": "more"})));
    }

    #[test]
    fn test_coerce_bool_tokens() {
        assert_eq!(coerce_bool(&json!("ENABLED")), Some(true));
        assert_eq!(coerce_bool(&json!(" n ")), Some(false));
        assert_eq!(coerce_bool(&json!("2")), Some(true));
        assert_eq!(coerce_bool(&json!("maybe")), None);
        assert_eq!(coerce_bool(&json!("NaN")), None);
        assert_eq!(coerce_bool(&json!("inf")), None);
        assert_eq!(coerce_bool(&json!("-Infinity")), None);
        assert_eq!(coerce_bool(&json!([])), None);
    }
}
