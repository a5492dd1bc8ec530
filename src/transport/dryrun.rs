//! Transport that never leaves the process.
//!
//! Answers every call with a deterministic synthetic success so flows can run
//! end to end where a live broker must not be contacted.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::errors::{CanonicalError, TransportOutcome};
use super::traits::WhatsAppTransport;
use super::types::{
    normalize_phone, InstanceStatus, RecipientCheck, SendMediaRequest, SendTextRequest,
    TransportName, TransportResult,
};

const NAME: TransportName = TransportName::DryRun;

#[derive(Debug, Default)]
pub struct DryRunTransport {
    sequence: AtomicU64,
    calls: AtomicU64,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls answered so far, any operation
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn recipient(&self, to: &str) -> TransportOutcome<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let digits = normalize_phone(to);
        if digits.is_empty() {
            return Err(CanonicalError::invalid_request(
                format!("Recipient '{to}' has no digits"),
                NAME,
            ));
        }
        Ok(digits)
    }

    fn synthetic_send(&self, instance_id: &str, to: &str, kind: &str) -> TransportResult {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let external_id = format!("dryrun-{instance_id}-{seq}");
        let timestamp = Utc::now();

        info!(
            instance_id = %instance_id,
            to = %to,
            kind = %kind,
            external_id = %external_id,
            "Dry-run transport accepted message"
        );

        TransportResult {
            raw: json!({
                "dryRun": true,
                "kind": kind,
                "to": to,
                "instanceId": instance_id,
                "externalId": external_id,
            }),
            external_id,
            status: "sent".to_string(),
            timestamp,
            transport: NAME,
        }
    }
}

#[async_trait]
impl WhatsAppTransport for DryRunTransport {
    fn name(&self) -> TransportName {
        NAME
    }

    async fn send_text(&self, request: &SendTextRequest) -> TransportOutcome<TransportResult> {
        let to = self.recipient(&request.to)?;
        Ok(self.synthetic_send(&request.instance_id, &to, "text"))
    }

    async fn send_media(&self, request: &SendMediaRequest) -> TransportOutcome<TransportResult> {
        let to = self.recipient(&request.to)?;
        let kind = match request.media_type {
            super::MediaKind::Image => "image",
            super::MediaKind::Video => "video",
            super::MediaKind::Audio => "audio",
            super::MediaKind::Document => "document",
        };
        Ok(self.synthetic_send(&request.instance_id, &to, kind))
    }

    async fn check_recipient(
        &self,
        _instance_id: &str,
        phone: &str,
    ) -> TransportOutcome<RecipientCheck> {
        let digits = self.recipient(phone)?;
        Ok(RecipientCheck {
            jid: Some(format!("{digits}@s.whatsapp.net")),
            phone: digits,
            exists: true,
            transport: NAME,
        })
    }

    async fn get_status(&self, instance_id: &str) -> TransportOutcome<InstanceStatus> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(InstanceStatus {
            instance_id: instance_id.to_string(),
            connected: true,
            status: "connected".to_string(),
            raw: json!({"dryRun": true}),
            transport: NAME,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorCode;

    #[tokio::test]
    async fn test_ids_are_sequential_per_transport() {
        let transport = DryRunTransport::new();
        let first = transport
            .send_text(&SendTextRequest::new("inst-1", "5511", "a"))
            .await
            .unwrap();
        let second = transport
            .send_text(&SendTextRequest::new("inst-1", "5511", "b"))
            .await
            .unwrap();

        assert_eq!(first.external_id, "dryrun-inst-1-1");
        assert_eq!(second.external_id, "dryrun-inst-1-2");
        assert_eq!(first.status, "sent");
        assert_eq!(first.raw["dryRun"], true);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_recipient_check_synthesizes_jid() {
        let transport = DryRunTransport::new();
        let check = transport
            .check_recipient("inst-1", "+55 (11) 4000")
            .await
            .unwrap();
        assert!(check.exists);
        assert_eq!(check.phone, "55114000");
        assert_eq!(check.jid.as_deref(), Some("55114000@s.whatsapp.net"));
    }

    #[tokio::test]
    async fn test_invalid_recipient() {
        let transport = DryRunTransport::new();
        let err = transport
            .send_text(&SendTextRequest::new("inst-1", "", "a"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert_eq!(err.transport, TransportName::DryRun);
    }
}
