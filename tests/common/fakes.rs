//! In-memory collaborators standing in for the broker, the cursor store and
//! event consumers

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wabroker_core::broker::{
    BrokerClientError, BrokerClientResult, BrokerEventSource, BrokerMessagingApi,
};
use wabroker_core::error::{BrokerError, BrokerResult};
use wabroker_core::events::{BrokerEvent, EventHandler, HandlerError};
use wabroker_core::poller::{CursorStore, InMemoryCursorStore};
use wabroker_core::transport::{SendMediaRequest, SendTextRequest};

/// Broker that replays scripted responses, then answers with `fallback`
pub struct ScriptedBroker {
    responses: Mutex<VecDeque<BrokerClientResult<Value>>>,
    fallback: Mutex<BrokerClientResult<Value>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl ScriptedBroker {
    pub fn new(responses: Vec<BrokerClientResult<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: Mutex::new(Ok(json!({}))),
            cursors: Mutex::new(Vec::new()),
        })
    }

    /// Broker whose every fetch fails
    pub fn failing(message: &str) -> Arc<Self> {
        let broker = Self::new(Vec::new());
        broker.set_fallback(Err(BrokerClientError::request(message)));
        broker
    }

    pub fn set_fallback(&self, response: BrokerClientResult<Value>) {
        *self.fallback.lock() = response;
    }

    pub fn push(&self, response: BrokerClientResult<Value>) {
        self.responses.lock().push_back(response);
    }

    /// Cursor passed to each fetch, in call order
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.cursors.lock().len()
    }
}

#[async_trait]
impl BrokerEventSource for ScriptedBroker {
    async fn fetch_events(&self, cursor: Option<&str>) -> BrokerClientResult<Value> {
        self.cursors.lock().push(cursor.map(str::to_string));
        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().clone())
    }
}

/// Messaging API returning one canned response for every call
pub struct CannedMessagingApi {
    response: BrokerClientResult<Value>,
    calls: AtomicUsize,
}

impl CannedMessagingApi {
    pub fn ok(body: Value) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(body),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn err(error: BrokerClientError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> BrokerClientResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

#[async_trait]
impl BrokerMessagingApi for CannedMessagingApi {
    async fn send_text(&self, _request: &SendTextRequest) -> BrokerClientResult<Value> {
        self.respond()
    }

    async fn send_media(&self, _request: &SendMediaRequest) -> BrokerClientResult<Value> {
        self.respond()
    }

    async fn check_recipient(&self, _instance_id: &str, _phone: &str) -> BrokerClientResult<Value> {
        self.respond()
    }

    async fn instance_status(&self, _instance_id: &str) -> BrokerClientResult<Value> {
        self.respond()
    }
}

/// Cursor store whose reads and writes can be made to fail
#[derive(Default)]
pub struct FlakyCursorStore {
    inner: InMemoryCursorStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyCursorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CursorStore for FlakyCursorStore {
    async fn get(&self, key: &str) -> BrokerResult<Option<Value>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BrokerError::cursor_store("read", "store offline"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> BrokerResult<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(BrokerError::cursor_store("write", "store offline"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}

/// Handler recording the events it sees into a log shared between handlers
pub struct RecordingHandler {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    panicking: Vec<String>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            log,
            delays: HashMap::new(),
            failing: Vec::new(),
            panicking: Vec::new(),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, event_id: &str, delay: Duration) -> Self {
        self.delays.insert(event_id.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, event_id: &str) -> Self {
        self.failing.push(event_id.to_string());
        self
    }

    pub fn panicking_on(mut self, event_id: &str) -> Self {
        self.panicking.push(event_id.to_string());
        self
    }

    /// Share the concurrency gauges with other handlers
    pub fn with_gauges(mut self, active: Arc<AtomicUsize>, max_active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self.max_active = max_active;
        self
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&event.id) {
            tokio::time::sleep(*delay).await;
        }
        self.log.lock().push(format!("{}:{}", self.name, event.id));
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&event.id) {
            panic!("handler {} blew up on {}", self.name, event.id);
        }
        if self.failing.contains(&event.id) {
            return Err(format!("handler {} rejected {}", self.name, event.id).into());
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}
