//! Cancelable sleep used between poll cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// How a [`CancelableSleep::wait`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Cancelled,
}

/// A sleep that another task can cut short
///
/// Cancellation is sticky: once [`cancel`](Self::cancel) is called, the
/// current wait and every later one return [`SleepOutcome::Cancelled`]
/// immediately. Build a new sleeper to sleep again.
#[derive(Debug, Default)]
pub struct CancelableSleep {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelableSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait(&self, duration: Duration) -> SleepOutcome {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return SleepOutcome::Cancelled;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => SleepOutcome::Elapsed,
            _ = &mut notified => SleepOutcome::Cancelled,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
