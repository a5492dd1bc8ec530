pub mod legacy;
pub mod normalizer;
pub mod queue;
pub mod types;

// Re-export key types for convenience
pub use legacy::LegacySignal;
pub use normalizer::{normalize_cursor_state, normalize_envelope, normalize_event};
pub use queue::{
    EventHandler, EventQueue, HandlerError, QueueStats, Subscription, SubscriptionKey,
};
pub use types::{BrokerEvent, BrokerEventType, CursorState, NormalizedEnvelope};
