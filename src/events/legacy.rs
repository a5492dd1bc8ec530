use tokio::sync::broadcast;

use super::types::BrokerEvent;

/// Fallback broadcast channel for events nobody subscribed to
///
/// Older consumers listen here instead of registering with the queue. An
/// emission with no listeners is silently dropped.
#[derive(Debug, Clone)]
pub struct LegacySignal {
    sender: broadcast::Sender<BrokerEvent>,
}

impl LegacySignal {
    /// Create a new signal channel with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event, returning how many listeners received it
    pub fn emit(&self, event: BrokerEvent) -> usize {
        // send() only fails when there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to fallback events
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active listeners
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LegacySignal {
    fn default() -> Self {
        Self::new(crate::constants::defaults::LEGACY_CHANNEL_CAPACITY)
    }
}
