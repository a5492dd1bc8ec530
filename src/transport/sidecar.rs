//! # Sidecar Transport
//!
//! Delivers through a WhatsApp session manager running alongside the
//! process instead of the remote broker. Sends require the target instance
//! to be connected, and recipient lookups are not available.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::errors::{CanonicalError, TransportOutcome};
use super::traits::WhatsAppTransport;
use super::types::{
    normalize_phone, InstanceStatus, RecipientCheck, SendMediaRequest, SendTextRequest,
    TransportName, TransportResult,
};
use crate::logging::log_transport_operation;

const NAME: TransportName = TransportName::Sidecar;

#[derive(Error, Debug, Clone)]
pub enum SidecarError {
    #[error("Instance '{instance_id}' is not connected")]
    NotConnected { instance_id: String },

    #[error("Instance '{instance_id}' is not managed by this sidecar")]
    UnknownInstance { instance_id: String },

    #[error("Sidecar rejected the message: {message}")]
    Rejected { message: String },

    #[error("Sidecar failure: {message}")]
    Failed { message: String },
}

/// Message accepted by the sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Connection state reported by the sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarInstanceState {
    pub instance_id: String,
    pub connected: bool,
    pub state: String,
}

/// Locally embedded WhatsApp session manager
#[async_trait]
pub trait SidecarInstanceManager: Send + Sync {
    async fn is_connected(&self, instance_id: &str) -> bool;

    /// `request.to` is already reduced to digits
    async fn send_text(&self, request: &SendTextRequest) -> Result<SidecarReceipt, SidecarError>;

    async fn send_media(&self, request: &SendMediaRequest) -> Result<SidecarReceipt, SidecarError>;

    async fn status(&self, instance_id: &str) -> Result<SidecarInstanceState, SidecarError>;
}

/// What an [`InMemorySidecarManager`] was asked to send
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarOutbound {
    Text(SendTextRequest),
    Media(SendMediaRequest),
}

/// Session manager that keeps instance state in memory and records sends
#[derive(Debug, Default)]
pub struct InMemorySidecarManager {
    instances: DashMap<String, bool>,
    sent: Mutex<Vec<SidecarOutbound>>,
    sequence: AtomicU64,
}

impl InMemorySidecarManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, instance_id: impl Into<String>) {
        self.instances.insert(instance_id.into(), true);
    }

    /// Keep the instance known but mark it offline
    pub fn disconnect(&self, instance_id: &str) {
        if let Some(mut connected) = self.instances.get_mut(instance_id) {
            *connected = false;
        }
    }

    pub fn sent(&self) -> Vec<SidecarOutbound> {
        self.sent.lock().clone()
    }

    fn accept(&self, instance_id: &str, outbound: SidecarOutbound) -> Result<SidecarReceipt, SidecarError> {
        match self.instances.get(instance_id).map(|entry| *entry) {
            None => {
                return Err(SidecarError::UnknownInstance {
                    instance_id: instance_id.to_string(),
                })
            }
            Some(false) => {
                return Err(SidecarError::NotConnected {
                    instance_id: instance_id.to_string(),
                })
            }
            Some(true) => {}
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.sent.lock().push(outbound);
        Ok(SidecarReceipt {
            message_id: format!("sidecar-{instance_id}-{seq}"),
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl SidecarInstanceManager for InMemorySidecarManager {
    async fn is_connected(&self, instance_id: &str) -> bool {
        self.instances
            .get(instance_id)
            .map(|entry| *entry)
            .unwrap_or(false)
    }

    async fn send_text(&self, request: &SendTextRequest) -> Result<SidecarReceipt, SidecarError> {
        self.accept(&request.instance_id, SidecarOutbound::Text(request.clone()))
    }

    async fn send_media(&self, request: &SendMediaRequest) -> Result<SidecarReceipt, SidecarError> {
        self.accept(&request.instance_id, SidecarOutbound::Media(request.clone()))
    }

    async fn status(&self, instance_id: &str) -> Result<SidecarInstanceState, SidecarError> {
        let connected = self
            .instances
            .get(instance_id)
            .map(|entry| *entry)
            .ok_or_else(|| SidecarError::UnknownInstance {
                instance_id: instance_id.to_string(),
            })?;
        Ok(SidecarInstanceState {
            instance_id: instance_id.to_string(),
            connected,
            state: if connected { "open" } else { "close" }.to_string(),
        })
    }
}

pub struct SidecarTransport {
    manager: Arc<dyn SidecarInstanceManager>,
}

impl std::fmt::Debug for SidecarTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarTransport").finish_non_exhaustive()
    }
}

impl SidecarTransport {
    pub fn new(manager: Arc<dyn SidecarInstanceManager>) -> Self {
        Self { manager }
    }

    async fn ensure_connected(&self, instance_id: &str) -> TransportOutcome<()> {
        if self.manager.is_connected(instance_id).await {
            Ok(())
        } else {
            warn!(instance_id = %instance_id, "Sidecar instance is not connected");
            Err(CanonicalError::instance_not_connected(instance_id, NAME))
        }
    }

    fn recipient(to: &str) -> TransportOutcome<String> {
        let digits = normalize_phone(to);
        if digits.is_empty() {
            return Err(CanonicalError::invalid_request(
                format!("Recipient '{to}' has no digits"),
                NAME,
            ));
        }
        Ok(digits)
    }

    fn into_result(receipt: SidecarReceipt, to: &str) -> TransportResult {
        TransportResult {
            raw: json!({
                "messageId": receipt.message_id,
                "to": to,
                "timestamp": receipt.timestamp,
            }),
            external_id: receipt.message_id,
            status: "sent".to_string(),
            timestamp: receipt.timestamp,
            transport: NAME,
        }
    }
}

#[async_trait]
impl WhatsAppTransport for SidecarTransport {
    fn name(&self) -> TransportName {
        NAME
    }

    async fn send_text(&self, request: &SendTextRequest) -> TransportOutcome<TransportResult> {
        let mut request = request.clone();
        request.to = Self::recipient(&request.to)?;
        self.ensure_connected(&request.instance_id).await?;

        let receipt = self
            .manager
            .send_text(&request)
            .await
            .map_err(CanonicalError::from_sidecar)?;
        log_transport_operation(NAME, "send_text", &request.instance_id, "success", None);
        Ok(Self::into_result(receipt, &request.to))
    }

    async fn send_media(&self, request: &SendMediaRequest) -> TransportOutcome<TransportResult> {
        let mut request = request.clone();
        request.to = Self::recipient(&request.to)?;
        self.ensure_connected(&request.instance_id).await?;

        let receipt = self
            .manager
            .send_media(&request)
            .await
            .map_err(CanonicalError::from_sidecar)?;
        log_transport_operation(NAME, "send_media", &request.instance_id, "success", None);
        Ok(Self::into_result(receipt, &request.to))
    }

    async fn check_recipient(
        &self,
        _instance_id: &str,
        _phone: &str,
    ) -> TransportOutcome<RecipientCheck> {
        Err(CanonicalError::unsupported("check_recipient", NAME))
    }

    async fn get_status(&self, instance_id: &str) -> TransportOutcome<InstanceStatus> {
        let state = self
            .manager
            .status(instance_id)
            .await
            .map_err(CanonicalError::from_sidecar)?;
        debug!(instance_id = %instance_id, state = %state.state, "Sidecar status read");

        Ok(InstanceStatus {
            raw: json!(state),
            instance_id: state.instance_id,
            connected: state.connected,
            status: state.state,
            transport: NAME,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorCode;

    fn transport() -> (Arc<InMemorySidecarManager>, SidecarTransport) {
        let manager = Arc::new(InMemorySidecarManager::new());
        let transport = SidecarTransport::new(manager.clone());
        (manager, transport)
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (manager, transport) = transport();
        manager.connect("inst-1");
        manager.disconnect("inst-1");

        let err = transport
            .send_text(&SendTextRequest::new("inst-1", "5511", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InstanceNotConnected);
        assert_eq!(err.transport, TransportName::Sidecar);
        assert!(manager.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_when_connected() {
        let (manager, transport) = transport();
        manager.connect("inst-1");

        let result = transport
            .send_text(&SendTextRequest::new("inst-1", "+55 11 9", "hi"))
            .await
            .unwrap();
        assert_eq!(result.external_id, "sidecar-inst-1-1");
        assert_eq!(result.status, "sent");

        match manager.sent().as_slice() {
            [SidecarOutbound::Text(sent)] => assert_eq!(sent.to, "55119"),
            other => panic!("unexpected sends: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recipient_check_is_unsupported() {
        let (manager, transport) = transport();
        manager.connect("inst-1");
        let err = transport.check_recipient("inst-1", "5511").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
    }

    #[tokio::test]
    async fn test_status_of_unknown_instance() {
        let (manager, transport) = transport();
        let err = transport.get_status("ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        manager.connect("inst-2");
        let status = transport.get_status("inst-2").await.unwrap();
        assert!(status.connected);
        assert_eq!(status.status, "open");
    }
}
