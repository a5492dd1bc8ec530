use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of one poller's state
///
/// The poller updates its copy every iteration and clears it on stop;
/// callers only ever get clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerMetrics {
    pub running: bool,
    pub cursor: Option<String>,
    /// Event queue backlog at the end of the last cycle, failed or not
    pub pending_queue: usize,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_count: usize,
    pub last_ack_at: Option<DateTime<Utc>>,
    pub last_ack_cursor: Option<String>,
    pub last_ack_count: usize,
    pub consecutive_failures: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    /// Backoff applied after the last failure, zero when healthy
    pub backoff_ms: u64,
}

impl PollerMetrics {
    pub(crate) fn record_fetch(&mut self, count: usize) {
        self.last_fetch_at = Some(Utc::now());
        self.last_fetch_count = count;
    }

    pub(crate) fn record_ack(&mut self, cursor: &str, count: usize) {
        self.cursor = Some(cursor.to_string());
        self.last_ack_at = Some(Utc::now());
        self.last_ack_cursor = Some(cursor.to_string());
        self.last_ack_count = count;
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error_at = None;
        self.last_error_message = None;
        self.backoff_ms = 0;
    }

    pub(crate) fn record_failure(&mut self, message: String, backoff_ms: u64) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error_at = Some(Utc::now());
        self.last_error_message = Some(message);
        self.backoff_ms = backoff_ms;
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_then_success_clears_error() {
        let mut metrics = PollerMetrics::default();
        assert_eq!(metrics.record_failure("boom".to_string(), 1000), 1);
        assert_eq!(metrics.record_failure("boom".to_string(), 2000), 2);
        assert_eq!(metrics.backoff_ms, 2000);

        metrics.record_success();
        assert_eq!(metrics.consecutive_failures, 0);
        assert!(metrics.last_error_message.is_none());
        assert_eq!(metrics.backoff_ms, 0);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut metrics = PollerMetrics::default();
        metrics.record_ack("c1", 3);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["lastAckCursor"], "c1");
        assert_eq!(json["lastAckCount"], 3);
        assert_eq!(json["cursor"], "c1");
    }
}
