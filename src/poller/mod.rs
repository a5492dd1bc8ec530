//! # Poller Module
//!
//! Pull-based ingestion from the broker: the [`EventPoller`] loop and the
//! pieces it is built from (response extraction, delay policy, cancelable
//! sleep, metrics and cursor persistence).

pub mod backoff;
pub mod cursor_store;
pub mod event_poller;
pub mod extraction;
pub mod metrics;
pub mod sleeper;

pub use backoff::{BackoffPolicy, PollSchedule};
pub use cursor_store::{CursorStore, InMemoryCursorStore, JsonFileCursorStore};
pub use event_poller::{EventPoller, PollCycleOutcome};
pub use metrics::PollerMetrics;
pub use sleeper::{CancelableSleep, SleepOutcome};
