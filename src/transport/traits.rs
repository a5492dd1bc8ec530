use async_trait::async_trait;

use super::errors::TransportOutcome;
use super::types::{
    InstanceStatus, RecipientCheck, SendMediaRequest, SendTextRequest, TransportName,
    TransportResult,
};

/// Outbound WhatsApp delivery
///
/// Implemented by the HTTP broker, sidecar and dry-run transports. Every
/// failure is a [`CanonicalError`](super::CanonicalError), whichever
/// implementation raised it.
#[async_trait]
pub trait WhatsAppTransport: Send + Sync {
    /// Which implementation this is
    fn name(&self) -> TransportName;

    async fn send_text(&self, request: &SendTextRequest) -> TransportOutcome<TransportResult>;

    async fn send_media(&self, request: &SendMediaRequest) -> TransportOutcome<TransportResult>;

    /// Whether `phone` is registered on WhatsApp
    async fn check_recipient(
        &self,
        instance_id: &str,
        phone: &str,
    ) -> TransportOutcome<RecipientCheck>;

    async fn get_status(&self, instance_id: &str) -> TransportOutcome<InstanceStatus>;
}
