//! # Event Queue
//!
//! Ordered, serialized dispatcher for normalized broker events.
//!
//! ## Overview
//!
//! Every enqueued event, whatever its type, goes through one dispatch task in
//! submission order. A dispatch awaits each handler registered for the
//! event's type, then each wildcard handler, one after another; the next
//! event is not touched until all of them have settled. Handler failures
//! (errors or panics) are logged and counted, never propagated: one bad
//! handler cannot starve the others or stall the queue.
//!
//! Events that find no handler at all are emitted on the [`LegacySignal`]
//! channel instead.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wabroker_core::events::{BrokerEvent, BrokerEventType, EventQueue, SubscriptionKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = EventQueue::new();
//! let subscription = queue.subscribe_fn(SubscriptionKey::Wildcard, |event: BrokerEvent| async move {
//!     println!("received {}", event.id);
//!     Ok(())
//! });
//!
//! queue.enqueue(vec![BrokerEvent::new("e1", BrokerEventType::MessageInbound)])?;
//! queue.wait_idle().await;
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};

use super::legacy::LegacySignal;
use super::types::{BrokerEvent, BrokerEventType};
use crate::constants::WILDCARD;
use crate::error::{BrokerError, BrokerResult};
use crate::logging::log_queue_operation;

/// Error type returned by event handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of dispatched events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError>;

    /// Handler name for identification in logs
    fn handler_name(&self) -> &str {
        "unnamed_handler"
    }
}

struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(BrokerEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError> {
        (self.func)(event.clone()).await
    }

    fn handler_name(&self) -> &str {
        "fn_handler"
    }
}

/// What a handler subscribes to: one event type or every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Type(BrokerEventType),
    Wildcard,
}

impl From<BrokerEventType> for SubscriptionKey {
    fn from(event_type: BrokerEventType) -> Self {
        SubscriptionKey::Type(event_type)
    }
}

impl FromStr for SubscriptionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == WILDCARD {
            return Ok(SubscriptionKey::Wildcard);
        }
        s.parse::<BrokerEventType>().map(SubscriptionKey::Type)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Type(t) => write!(f, "{t}"),
            SubscriptionKey::Wildcard => f.write_str(WILDCARD),
        }
    }
}

#[derive(Default)]
struct HandlerRegistry {
    handlers: DashMap<SubscriptionKey, BTreeMap<u64, Arc<dyn EventHandler>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    fn insert(&self, key: SubscriptionKey, handler: Arc<dyn EventHandler>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.entry(key).or_default().insert(id, handler);
        id
    }

    fn remove(&self, key: SubscriptionKey, id: u64) -> bool {
        let removed = self
            .handlers
            .get_mut(&key)
            .map(|mut set| set.remove(&id).is_some())
            .unwrap_or(false);
        self.handlers.remove_if(&key, |_, set| set.is_empty());
        removed
    }

    /// Type handlers first, then wildcard handlers, each in registration order
    fn snapshot(&self, event_type: BrokerEventType) -> Vec<Arc<dyn EventHandler>> {
        [SubscriptionKey::Type(event_type), SubscriptionKey::Wildcard]
            .iter()
            .filter_map(|key| self.handlers.get(key))
            .flat_map(|set| set.values().cloned().collect::<Vec<_>>())
            .collect()
    }

    fn count(&self) -> usize {
        self.handlers.iter().map(|set| set.len()).sum()
    }
}

/// Handle returned by [`EventQueue::subscribe`]
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    key: SubscriptionKey,
    id: u64,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    /// Remove this handler from the queue. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.key, self.id),
            None => false,
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        self.key
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Events enqueued whose dispatch has not settled yet
    pub pending: usize,
    pub dispatched: u64,
    pub handler_failures: u64,
    pub legacy_emitted: u64,
}

#[derive(Default)]
struct QueueCounters {
    pending: AtomicUsize,
    dispatched: AtomicU64,
    handler_failures: AtomicU64,
    legacy_emitted: AtomicU64,
    idle: Notify,
}

/// Serialized event dispatcher with a subscribable handler registry
pub struct EventQueue {
    registry: Arc<HandlerRegistry>,
    legacy: LegacySignal,
    counters: Arc<QueueCounters>,
    sender: mpsc::UnboundedSender<BrokerEvent>,
    receiver: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<BrokerEvent>>>,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("handlers", &self.registry.count())
            .field("stats", &self.stats())
            .field("legacy_listeners", &self.legacy.subscriber_count())
            .finish()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_legacy_signal(LegacySignal::default())
    }

    /// Create a queue emitting unhandled events on the given legacy channel
    pub fn with_legacy_signal(legacy: LegacySignal) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            registry: Arc::new(HandlerRegistry::default()),
            legacy,
            counters: Arc::new(QueueCounters::default()),
            sender,
            receiver: parking_lot::Mutex::new(Some(receiver)),
        }
    }

    /// Register a handler for one event type or for every event
    pub fn subscribe(
        &self,
        key: impl Into<SubscriptionKey>,
        handler: Arc<dyn EventHandler>,
    ) -> Subscription {
        let key = key.into();
        let name = handler.handler_name().to_string();
        let id = self.registry.insert(key, handler);
        log_queue_operation(
            "subscribe",
            Some(&key.to_string()),
            self.counters.pending.load(Ordering::SeqCst),
            Some(&name),
        );
        Subscription {
            key,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register an async closure as a handler
    pub fn subscribe_fn<F, Fut>(&self, key: impl Into<SubscriptionKey>, func: F) -> Subscription
    where
        F: Fn(BrokerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe(key, Arc::new(FnHandler { func }))
    }

    /// Queue events for dispatch in the order given
    ///
    /// Returns as soon as the events are queued; dispatch happens on the
    /// queue's own task. Must be called from within a Tokio runtime.
    pub fn enqueue(&self, events: Vec<BrokerEvent>) -> BrokerResult<usize> {
        self.ensure_dispatcher()?;

        let count = events.len();
        for event in events {
            let pending = self.counters.pending.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                pending = pending,
                "Enqueued broker event"
            );
            if self.sender.send(event).is_err() {
                self.settle_one();
                return Err(BrokerError::queue("Dispatch task is no longer running"));
            }
        }
        Ok(count)
    }

    /// Wait until every event enqueued so far has been dispatched
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.counters.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.counters.pending.load(Ordering::SeqCst),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            legacy_emitted: self.counters.legacy_emitted.load(Ordering::Relaxed),
        }
    }

    /// Number of registered handlers across all keys
    pub fn handler_count(&self) -> usize {
        self.registry.count()
    }

    /// Channel receiving events that had no handler
    pub fn legacy_signal(&self) -> &LegacySignal {
        &self.legacy
    }

    /// Drop every subscription
    pub fn reset(&self) {
        self.registry.handlers.clear();
        log_queue_operation(
            "reset",
            None,
            self.counters.pending.load(Ordering::SeqCst),
            None,
        );
    }

    fn settle_one(&self) {
        settle(&self.counters);
    }

    fn ensure_dispatcher(&self) -> BrokerResult<()> {
        let mut slot = self.receiver.lock();
        if slot.is_none() {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BrokerError::queue(format!("No async runtime for dispatch: {e}")))?;
        if let Some(receiver) = slot.take() {
            handle.spawn(dispatch_loop(
                receiver,
                Arc::clone(&self.registry),
                self.legacy.clone(),
                Arc::clone(&self.counters),
            ));
        }
        Ok(())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn settle(counters: &QueueCounters) {
    counters.pending.fetch_sub(1, Ordering::SeqCst);
    counters.idle.notify_waiters();
}

async fn dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<BrokerEvent>,
    registry: Arc<HandlerRegistry>,
    legacy: LegacySignal,
    counters: Arc<QueueCounters>,
) {
    debug!("Event dispatch task started");
    while let Some(event) = receiver.recv().await {
        dispatch(&event, &registry, &legacy, &counters).await;
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        settle(&counters);
    }
    debug!("Event dispatch task stopped");
}

async fn dispatch(
    event: &BrokerEvent,
    registry: &HandlerRegistry,
    legacy: &LegacySignal,
    counters: &QueueCounters,
) {
    let handlers = registry.snapshot(event.event_type);

    if handlers.is_empty() {
        let listeners = legacy.emit(event.clone());
        counters.legacy_emitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            listeners = listeners,
            "No handlers registered, emitted on legacy channel"
        );
        return;
    }

    for handler in handlers {
        match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    handler = %handler.handler_name(),
                    error = %e,
                    "Event handler failed"
                );
            }
            Err(_) => {
                counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    handler = %handler.handler_name(),
                    "Event handler panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn event(id: &str, event_type: BrokerEventType) -> BrokerEvent {
        BrokerEvent::new(id, event_type)
    }

    #[test]
    fn test_subscription_key_parsing() {
        assert_eq!("*".parse::<SubscriptionKey>().unwrap(), SubscriptionKey::Wildcard);
        assert_eq!(
            "poll_choice".parse::<SubscriptionKey>().unwrap(),
            SubscriptionKey::Type(BrokerEventType::PollChoice)
        );
        assert!("bogus".parse::<SubscriptionKey>().is_err());
    }

    #[test]
    fn test_enqueue_outside_runtime_fails() {
        let queue = EventQueue::new();
        let result = queue.enqueue(vec![event("e1", BrokerEventType::PollChoice)]);
        assert!(matches!(result, Err(BrokerError::Queue { .. })));
        assert_eq!(queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_type_handlers_run_before_wildcard() {
        let queue = EventQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        queue.subscribe_fn(SubscriptionKey::Wildcard, move |e: BrokerEvent| {
            let s = Arc::clone(&s);
            async move {
                s.lock().push(format!("wildcard:{}", e.id));
                Ok(())
            }
        });
        let s = Arc::clone(&seen);
        queue.subscribe_fn(BrokerEventType::MessageInbound, move |e: BrokerEvent| {
            let s = Arc::clone(&s);
            async move {
                s.lock().push(format!("typed:{}", e.id));
                Ok(())
            }
        });

        queue
            .enqueue(vec![
                event("a", BrokerEventType::MessageInbound),
                event("b", BrokerEventType::PollChoice),
            ])
            .unwrap();
        queue.wait_idle().await;

        assert_eq!(
            *seen.lock(),
            vec!["typed:a", "wildcard:a", "wildcard:b"]
        );
        assert_eq!(queue.stats().dispatched, 2);
    }

    #[tokio::test]
    async fn test_unhandled_event_goes_to_legacy_channel() {
        let queue = EventQueue::new();
        let mut legacy_rx = queue.legacy_signal().subscribe();
        let sub = queue.subscribe_fn(BrokerEventType::PollChoice, |_e: BrokerEvent| async { Ok(()) });

        queue
            .enqueue(vec![event("x", BrokerEventType::MessageOutbound)])
            .unwrap();
        queue.wait_idle().await;

        let received = tokio::time::timeout(Duration::from_secs(1), legacy_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, "x");
        assert_eq!(queue.stats().legacy_emitted, 1);
        assert!(sub.unsubscribe());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_reset() {
        let queue = EventQueue::new();
        let sub = queue.subscribe_fn(SubscriptionKey::Wildcard, |_e: BrokerEvent| async { Ok(()) });
        queue.subscribe_fn(BrokerEventType::PollChoice, |_e: BrokerEvent| async { Ok(()) });
        assert_eq!(queue.handler_count(), 2);

        assert!(sub.unsubscribe());
        assert_eq!(queue.handler_count(), 1);

        queue.reset();
        assert_eq!(queue.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let queue = EventQueue::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        queue.subscribe_fn(SubscriptionKey::Wildcard, |e: BrokerEvent| async move {
            if e.id == "boom" {
                panic!("handler exploded");
            }
            Ok(())
        });
        let d = Arc::clone(&delivered);
        queue.subscribe_fn(SubscriptionKey::Wildcard, move |_e: BrokerEvent| {
            let d = Arc::clone(&d);
            async move {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        queue
            .enqueue(vec![
                event("boom", BrokerEventType::MessageInbound),
                event("fine", BrokerEventType::MessageInbound),
            ])
            .unwrap();
        queue.wait_idle().await;

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().handler_failures, 1);
        assert_eq!(queue.stats().pending, 0);
    }
}
