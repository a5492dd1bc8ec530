//! Dispatch ordering and fault isolation of the event queue

mod common;

use common::RecordingHandler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wabroker_core::events::{
    BrokerEvent, BrokerEventType, EventQueue, HandlerError, LegacySignal, SubscriptionKey,
};

fn inbound(id: &str) -> BrokerEvent {
    BrokerEvent::new(id, BrokerEventType::MessageInbound)
}

#[tokio::test]
async fn test_dispatch_follows_enqueue_order_despite_handler_latency() {
    let queue = EventQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    // earlier events take longer, so any concurrency would reorder the log
    let mut handler = RecordingHandler::new("h", Arc::clone(&log));
    for i in 0..8u64 {
        handler = handler.with_delay(&format!("e{i}"), Duration::from_millis(16 - 2 * i));
    }
    queue.subscribe(SubscriptionKey::Wildcard, Arc::new(handler));

    queue
        .enqueue((0..4).map(|i| inbound(&format!("e{i}"))).collect())
        .unwrap();
    queue
        .enqueue((4..8).map(|i| inbound(&format!("e{i}"))).collect())
        .unwrap();
    queue.wait_idle().await;

    let expected: Vec<String> = (0..8).map(|i| format!("h:e{i}")).collect();
    assert_eq!(*log.lock(), expected);
    assert_eq!(queue.stats().dispatched, 8);
    assert_eq!(queue.stats().pending, 0);
}

#[tokio::test]
async fn test_handlers_never_overlap() {
    let queue = EventQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let typed = RecordingHandler::new("typed", Arc::clone(&log))
        .with_delay("e1", Duration::from_millis(10))
        .with_gauges(Arc::clone(&active), Arc::clone(&max_active));
    let wildcard = RecordingHandler::new("any", Arc::clone(&log))
        .with_delay("e2", Duration::from_millis(10))
        .with_gauges(Arc::clone(&active), Arc::clone(&max_active));
    queue.subscribe(BrokerEventType::MessageInbound, Arc::new(typed));
    queue.subscribe(SubscriptionKey::Wildcard, Arc::new(wildcard));

    queue
        .enqueue(vec![inbound("e1"), inbound("e2"), inbound("e3")])
        .unwrap();
    queue.wait_idle().await;

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        *log.lock(),
        vec!["typed:e1", "any:e1", "typed:e2", "any:e2", "typed:e3", "any:e3"]
    );
}

#[tokio::test]
async fn test_type_handlers_only_see_their_type() {
    let queue = EventQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    queue.subscribe(
        BrokerEventType::PollChoice,
        Arc::new(RecordingHandler::new("poll", Arc::clone(&log))),
    );
    queue.subscribe(
        SubscriptionKey::Wildcard,
        Arc::new(RecordingHandler::new("any", Arc::clone(&log))),
    );

    queue
        .enqueue(vec![
            inbound("e1"),
            BrokerEvent::new("p1", BrokerEventType::PollChoice),
        ])
        .unwrap();
    queue.wait_idle().await;

    assert_eq!(*log.lock(), vec!["any:e1", "poll:p1", "any:p1"]);
}

#[tokio::test]
async fn test_failing_and_panicking_handlers_are_isolated() {
    let queue = EventQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let faulty = RecordingHandler::new("faulty", Arc::clone(&log))
        .failing_on("e1")
        .panicking_on("e2");
    queue.subscribe(SubscriptionKey::Wildcard, Arc::new(faulty));
    queue.subscribe(
        SubscriptionKey::Wildcard,
        Arc::new(RecordingHandler::new("steady", Arc::clone(&log))),
    );

    queue
        .enqueue(vec![inbound("e1"), inbound("e2"), inbound("e3")])
        .unwrap();
    queue.wait_idle().await;

    assert_eq!(
        *log.lock(),
        vec![
            "faulty:e1",
            "steady:e1",
            "faulty:e2",
            "steady:e2",
            "faulty:e3",
            "steady:e3"
        ]
    );
    let stats = queue.stats();
    assert_eq!(stats.handler_failures, 2);
    assert_eq!(stats.dispatched, 3);
}

#[tokio::test]
async fn test_unhandled_events_go_to_legacy_channel() {
    let queue = EventQueue::with_legacy_signal(LegacySignal::new(8));
    let mut legacy = queue.legacy_signal().subscribe();

    queue.enqueue(vec![inbound("orphan")]).unwrap();
    queue.wait_idle().await;

    let received = tokio::time::timeout(Duration::from_secs(1), legacy.recv())
        .await
        .expect("legacy emission")
        .unwrap();
    assert_eq!(received.id, "orphan");
    assert_eq!(queue.stats().legacy_emitted, 1);
}

#[tokio::test]
async fn test_legacy_channel_silent_when_any_handler_matches() {
    let queue = EventQueue::new();
    let mut legacy = queue.legacy_signal().subscribe();
    let log = Arc::new(Mutex::new(Vec::new()));
    queue.subscribe(
        BrokerEventType::MessageInbound,
        Arc::new(RecordingHandler::new("h", Arc::clone(&log))),
    );

    queue.enqueue(vec![inbound("e1")]).unwrap();
    queue.wait_idle().await;

    assert!(legacy.try_recv().is_err());
    assert_eq!(queue.stats().legacy_emitted, 0);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let queue = EventQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let subscription = queue.subscribe(
        SubscriptionKey::Wildcard,
        Arc::new(RecordingHandler::new("h", Arc::clone(&log))),
    );

    queue.enqueue(vec![inbound("e1")]).unwrap();
    queue.wait_idle().await;

    assert!(subscription.unsubscribe());
    assert_eq!(queue.handler_count(), 0);

    queue.enqueue(vec![inbound("e2")]).unwrap();
    queue.wait_idle().await;

    assert_eq!(*log.lock(), vec!["h:e1"]);
    assert_eq!(queue.stats().legacy_emitted, 1);
}

#[tokio::test]
async fn test_closure_subscriptions_receive_events() {
    let queue = EventQueue::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let key = "message_inbound".parse::<SubscriptionKey>().unwrap();
    queue.subscribe_fn(key, move |event: BrokerEvent| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(event.id);
            Ok::<(), HandlerError>(())
        }
    });

    queue.enqueue(vec![inbound("e1"), inbound("e2")]).unwrap();
    queue.wait_idle().await;

    assert_eq!(*seen.lock(), vec!["e1".to_string(), "e2".to_string()]);
}
