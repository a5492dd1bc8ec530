//! # Event Poller
//!
//! Long-running loop that pulls events from the broker and feeds the
//! [`EventQueue`].
//!
//! ## Cycle
//!
//! 1. Re-read the live runtime settings; stop cleanly if polling is disabled
//!    or the transport mode moved away from HTTP.
//! 2. Fetch with the current cursor.
//! 3. Extract candidates, normalize them, drop the malformed ones.
//! 4. Enqueue the normalized events and persist the ack cursor when it moved.
//!    With nothing normalized, a moved envelope cursor is still persisted.
//! 5. Sleep for the success delay (events found or more pending) or the idle
//!    delay. A failed fetch or persist sleeps for the exponential backoff
//!    instead and the loop carries on.
//!
//! Sleeps are cancelable: [`EventPoller::stop`] wakes the loop immediately.
//!
//! ## Delivery
//!
//! The cursor is persisted once events are enqueued, not once their handlers
//! finish, so a crash in between replays those events on restart
//! (at-least-once). `ack_after_dispatch` waits for the queue to drain before
//! persisting, which narrows that window without closing it.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::PollSchedule;
use super::cursor_store::CursorStore;
use super::extraction::{envelope_cursor, extract_candidates, resolve_ack_cursor, resolve_has_more};
use super::metrics::PollerMetrics;
use super::sleeper::{CancelableSleep, SleepOutcome};
use crate::broker::BrokerEventSource;
use crate::config::{PollerConfig, RuntimeSettingsSource};
use crate::constants::POLLER_CURSOR_KEY;
use crate::error::{BrokerError, BrokerResult};
use crate::events::{normalize_cursor_state, normalize_envelope, EventQueue, NormalizedEnvelope};
use crate::logging::log_poller_cycle;

/// What one fetch–normalize–enqueue–ack cycle did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCycleOutcome {
    /// Candidates found in the response
    pub fetched: usize,
    /// Candidates that normalized and were enqueued
    pub normalized: usize,
    pub dropped: usize,
    /// Cursor resolved for acknowledgement, persisted or not
    pub ack_cursor: Option<String>,
    pub persisted: bool,
    pub has_more: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub next_delay: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Default)]
struct CursorSlot {
    loaded: bool,
    value: Option<String>,
}

struct PollerCore {
    poller_id: String,
    source: Arc<dyn BrokerEventSource>,
    store: Arc<dyn CursorStore>,
    queue: Arc<EventQueue>,
    runtime: Arc<dyn RuntimeSettingsSource>,
    schedule: PollSchedule,
    ack_after_dispatch: bool,
    metrics: parking_lot::RwLock<PollerMetrics>,
    /// Held for the whole of a cycle, so at most one is in flight
    cursor: AsyncMutex<CursorSlot>,
    stop_requested: AtomicBool,
    sleeper: parking_lot::Mutex<Arc<CancelableSleep>>,
}

/// Broker event poller
pub struct EventPoller {
    core: Arc<PollerCore>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPoller")
            .field("poller_id", &self.core.poller_id)
            .field("schedule", &self.core.schedule)
            .field("ack_after_dispatch", &self.core.ack_after_dispatch)
            .field("metrics", &*self.core.metrics.read())
            .finish()
    }
}

impl EventPoller {
    pub fn new(
        source: Arc<dyn BrokerEventSource>,
        store: Arc<dyn CursorStore>,
        queue: Arc<EventQueue>,
        runtime: Arc<dyn RuntimeSettingsSource>,
        config: &PollerConfig,
    ) -> Self {
        let poller_id = format!("broker-poller-{}", Uuid::new_v4());
        debug!(
            poller_id = %poller_id,
            success_delay_ms = config.success_delay_ms,
            idle_delay_ms = config.idle_delay_ms,
            ack_after_dispatch = config.ack_after_dispatch,
            "Creating EventPoller"
        );

        Self {
            core: Arc::new(PollerCore {
                poller_id,
                source,
                store,
                queue,
                runtime,
                schedule: PollSchedule::from_config(config),
                ack_after_dispatch: config.ack_after_dispatch,
                metrics: parking_lot::RwLock::new(PollerMetrics::default()),
                cursor: AsyncMutex::new(CursorSlot::default()),
                stop_requested: AtomicBool::new(false),
                sleeper: parking_lot::Mutex::new(Arc::new(CancelableSleep::new())),
            }),
            handle: AsyncMutex::new(None),
        }
    }

    pub fn poller_id(&self) -> &str {
        &self.core.poller_id
    }

    /// Start the background loop
    ///
    /// Returns false without starting when the loop is already running or the
    /// runtime settings say the poller should stay inactive. Must be called
    /// from within a Tokio runtime.
    pub async fn start(&self) -> bool {
        let mut handle = self.handle.lock().await;

        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!(poller_id = %self.core.poller_id, "Poller already running");
            return false;
        }

        let settings = self.core.runtime.current();
        if !settings.poller_should_run() {
            info!(
                poller_id = %self.core.poller_id,
                poller_disabled = settings.poller_disabled,
                transport_mode = %settings.transport_mode,
                "Broker poller not started: inactive for current settings"
            );
            return false;
        }

        let cursor = {
            let mut slot = self.core.cursor.lock().await;
            self.core.ensure_cursor_loaded(&mut slot).await;
            slot.value.clone()
        };

        self.core.stop_requested.store(false, Ordering::SeqCst);
        *self.core.sleeper.lock() = Arc::new(CancelableSleep::new());
        {
            let mut metrics = self.core.metrics.write();
            metrics.running = true;
            metrics.cursor = cursor.clone();
        }

        info!(
            poller_id = %self.core.poller_id,
            cursor = ?cursor,
            "Starting broker poller"
        );
        *handle = Some(tokio::spawn(Arc::clone(&self.core).run_loop()));
        true
    }

    /// Stop the loop, waking it from any sleep, and reset metrics
    ///
    /// Waits for an in-flight cycle to finish. Safe to call when not running.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;

        self.core.stop_requested.store(true, Ordering::SeqCst);
        self.core.sleeper.lock().cancel();

        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                error!(poller_id = %self.core.poller_id, error = %e, "Poller task ended abnormally");
            }
            info!(poller_id = %self.core.poller_id, "Broker poller stopped");
        }

        // reload from the store on the next start
        *self.core.cursor.lock().await = CursorSlot::default();
        *self.core.metrics.write() = PollerMetrics::default();
    }

    /// Copy of the current metrics
    pub fn metrics(&self) -> PollerMetrics {
        self.core.metrics.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.core.metrics.read().running
    }

    /// Run a single cycle outside the loop
    ///
    /// Failures are recorded in the metrics and returned; no backoff sleep
    /// happens here.
    pub async fn poll_once(&self) -> BrokerResult<PollCycleOutcome> {
        match self.core.poll_cycle().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.core.record_failure(&e);
                Err(e)
            }
        }
    }
}

impl PollerCore {
    async fn run_loop(self: Arc<Self>) {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            let settings = self.runtime.current();
            if !settings.poller_should_run() {
                info!(
                    poller_id = %self.poller_id,
                    poller_disabled = settings.poller_disabled,
                    transport_mode = %settings.transport_mode,
                    "Broker poller deactivated by runtime settings"
                );
                break;
            }

            let delay = match self.poll_cycle().await {
                Ok(outcome) => outcome.next_delay,
                Err(e) => self.record_failure(&e),
            };

            let sleeper = Arc::clone(&self.sleeper.lock());
            if sleeper.wait(delay).await == SleepOutcome::Cancelled {
                debug!(poller_id = %self.poller_id, "Poller sleep cancelled");
                break;
            }
        }

        self.metrics.write().running = false;
        debug!(poller_id = %self.poller_id, "Poller loop exited");
    }

    /// Record a failed cycle and return the backoff to sleep for
    fn record_failure(&self, err: &BrokerError) -> Duration {
        let mut metrics = self.metrics.write();
        let failures = metrics.consecutive_failures.saturating_add(1);
        let backoff = self.schedule.backoff.delay_for(failures);
        metrics.record_failure(err.to_string(), backoff.as_millis() as u64);
        metrics.pending_queue = self.queue.stats().pending;

        error!(
            poller_id = %self.poller_id,
            error = %err,
            consecutive_failures = failures,
            backoff_ms = backoff.as_millis() as u64,
            "Broker poll cycle failed"
        );
        backoff
    }

    async fn ensure_cursor_loaded(&self, slot: &mut CursorSlot) {
        if slot.loaded {
            return;
        }
        slot.value = match self.store.get(POLLER_CURSOR_KEY).await {
            Ok(Some(value)) => normalize_cursor_state(&value).cursor,
            Ok(None) => None,
            Err(e) => {
                warn!(
                    poller_id = %self.poller_id,
                    error = %e,
                    "Failed to load persisted cursor, starting from the beginning"
                );
                None
            }
        };
        slot.loaded = true;
    }

    async fn poll_cycle(&self) -> BrokerResult<PollCycleOutcome> {
        let mut slot = self.cursor.lock().await;
        self.ensure_cursor_loaded(&mut slot).await;
        let current = slot.value.clone();

        let payload = self.source.fetch_events(current.as_deref()).await?;

        let candidates = extract_candidates(&payload);
        let fetched = candidates.len();
        self.metrics.write().record_fetch(fetched);

        let envelopes = self.normalize_candidates(&candidates);
        let normalized = envelopes.len();
        let dropped = fetched - normalized;
        let has_more = resolve_has_more(&payload);

        let ack_cursor = if envelopes.is_empty() {
            envelope_cursor(&payload)
        } else {
            let ack_cursor = resolve_ack_cursor(&envelopes, &payload);
            self.dispatch(envelopes).await?;
            ack_cursor
        };

        let mut persisted = false;
        if let Some(cursor) = ack_cursor.as_deref() {
            if current.as_deref() != Some(cursor) {
                self.persist_cursor(cursor).await?;
                slot.value = Some(cursor.to_string());
                self.metrics.write().record_ack(cursor, normalized);
                persisted = true;
            }
        }

        let next_delay = self.schedule.next_delay(normalized > 0, has_more);
        {
            let mut metrics = self.metrics.write();
            metrics.record_success();
            metrics.pending_queue = self.queue.stats().pending;
        }

        log_poller_cycle(
            &self.poller_id,
            slot.value.as_deref(),
            fetched,
            normalized,
            persisted,
            next_delay,
        );

        Ok(PollCycleOutcome {
            fetched,
            normalized,
            dropped,
            ack_cursor,
            persisted,
            has_more,
            next_delay,
        })
    }

    fn normalize_candidates(&self, candidates: &[Value]) -> Vec<NormalizedEnvelope> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let envelope = normalize_envelope(candidate);
                if envelope.is_none() {
                    warn!(
                        poller_id = %self.poller_id,
                        index = index,
                        candidate_id = ?candidate.get("id"),
                        candidate_type = ?candidate.get("type"),
                        "Dropping malformed broker event candidate"
                    );
                }
                envelope
            })
            .collect()
    }

    async fn dispatch(&self, envelopes: Vec<NormalizedEnvelope>) -> BrokerResult<()> {
        let events = envelopes.into_iter().map(|envelope| envelope.event).collect();
        self.queue.enqueue(events)?;
        if self.ack_after_dispatch {
            self.queue.wait_idle().await;
        }
        Ok(())
    }

    async fn persist_cursor(&self, cursor: &str) -> BrokerResult<()> {
        self.store
            .set(POLLER_CURSOR_KEY, json!({ "cursor": cursor }))
            .await?;
        debug!(poller_id = %self.poller_id, cursor = %cursor, "Ack cursor persisted");
        Ok(())
    }
}
