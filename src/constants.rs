//! # System Constants
//!
//! Key-name tables and default timings. The broker has shipped several
//! payload conventions over time, so the key lists are kept here as data and
//! consumed by the extraction strategies in [`crate::poller::extraction`].

/// Well-known key under which the poller cursor is persisted
pub const POLLER_CURSOR_KEY: &str = "whatsapp:broker:poller:cursor";

/// Subscription key matching every event type
pub const WILDCARD: &str = "*";

/// Payload keys that may hold the event candidate array, in priority order
pub const CANDIDATE_ARRAY_KEYS: &[&str] = &[
    "events", "data", "items", "values", "records", "entries", "messages", "result", "results",
];

/// Envelope-level keys that may carry the acknowledgement cursor
pub const ACK_CURSOR_KEYS: &[&str] = &["ackCursor", "ack", "lastAckCursor", "lastAck", "cursor"];

/// Envelope-level keys that may carry the cursor for the next fetch
pub const NEXT_CURSOR_KEYS: &[&str] = &[
    "nextCursor",
    "next_cursor",
    "nextToken",
    "next_token",
    "next",
];

/// Keys that may carry the "more events pending" signal
pub const HAS_MORE_KEYS: &[&str] = &[
    "hasMore", "has_more", "more", "hasNext", "has_next", "pending", "remaining",
];

/// Nested pagination-like containers searched when a key is missing at the top level
pub const PAGINATION_CONTAINER_KEYS: &[&str] =
    &["pagination", "pageInfo", "page_info", "meta", "metadata"];

/// Keys probed, in order, when a cursor value is itself an object
pub const NESTED_CURSOR_KEYS: &[&str] = &["cursor", "token", "value"];

/// Keys probed, in order, when an acknowledgement id is itself an object
pub const NESTED_ACK_ID_KEYS: &[&str] = &["id", "value", "scope"];

/// Tokens coerced to `true` by has-more detection
pub const TRUTHY_TOKENS: &[&str] = &["1", "true", "yes", "y", "enabled", "more", "pending"];

/// Tokens coerced to `false` by has-more detection
pub const FALSY_TOKENS: &[&str] = &["0", "false", "no", "n", "disabled", "none"];

/// Maximum depth for recursive searches through nested containers
pub const MAX_SEARCH_DEPTH: usize = 4;

/// Default timings, in milliseconds
pub mod defaults {
    pub const SUCCESS_DELAY_MS: u64 = 500;
    pub const IDLE_DELAY_MS: u64 = 5_000;
    pub const BACKOFF_BASE_MS: u64 = 1_000;
    pub const BACKOFF_MAX_MS: u64 = 30_000;
    pub const BACKOFF_MAX_EXPONENT: u32 = 5;
    pub const BROKER_TIMEOUT_MS: u64 = 30_000;
    pub const LEGACY_CHANNEL_CAPACITY: usize = 1_000;
}
