//! Transport that delivers through the remote broker's messaging API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::errors::{CanonicalError, TransportOutcome};
use super::traits::WhatsAppTransport;
use super::types::{
    normalize_phone, InstanceStatus, RecipientCheck, SendMediaRequest, SendTextRequest,
    TransportName, TransportResult,
};
use crate::broker::BrokerMessagingApi;
use crate::events::normalizer::string_field;
use crate::logging::log_transport_operation;

const NAME: TransportName = TransportName::Http;

pub struct HttpBrokerTransport {
    api: Arc<dyn BrokerMessagingApi>,
}

impl std::fmt::Debug for HttpBrokerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBrokerTransport").finish_non_exhaustive()
    }
}

impl HttpBrokerTransport {
    pub fn new(api: Arc<dyn BrokerMessagingApi>) -> Self {
        Self { api }
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

    fn into_result(raw: Value) -> TransportOutcome<TransportResult> {
        let body = raw.get("data").filter(|d| d.is_object()).unwrap_or(&raw);
        let external_id = text_field(body, &["externalId", "messageId", "id"])
            .ok_or_else(|| {
                CanonicalError::new(
                    super::ErrorCode::UnknownError,
                    "Broker response carried no message id",
                    NAME,
                )
            })?;
        let status = text_field(body, &["status"]).unwrap_or_else(|| "sent".to_string());
        let timestamp = parse_timestamp(body.get("timestamp")).unwrap_or_else(Utc::now);

        Ok(TransportResult {
            external_id,
            status,
            timestamp,
            raw,
            transport: NAME,
        })
    }
}

fn text_field(body: &Value, keys: &[&str]) -> Option<String> {
    body.as_object().and_then(|obj| string_field(obj, keys))
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // seconds vs milliseconds
            if raw > 10_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

#[async_trait]
impl WhatsAppTransport for HttpBrokerTransport {
    fn name(&self) -> TransportName {
        NAME
    }

    async fn send_text(&self, request: &SendTextRequest) -> TransportOutcome<TransportResult> {
        let mut request = request.clone();
        request.to = Self::recipient(&request.to)?;

        let raw = self
            .api
            .send_text(&request)
            .await
            .map_err(|e| CanonicalError::from_broker(e, NAME))?;
        let result = Self::into_result(raw)?;
        log_transport_operation(NAME, "send_text", &request.instance_id, "success", None);
        Ok(result)
    }

    async fn send_media(&self, request: &SendMediaRequest) -> TransportOutcome<TransportResult> {
        let mut request = request.clone();
        request.to = Self::recipient(&request.to)?;

        let raw = self
            .api
            .send_media(&request)
            .await
            .map_err(|e| CanonicalError::from_broker(e, NAME))?;
        let result = Self::into_result(raw)?;
        log_transport_operation(NAME, "send_media", &request.instance_id, "success", None);
        Ok(result)
    }

    async fn check_recipient(
        &self,
        instance_id: &str,
        phone: &str,
    ) -> TransportOutcome<RecipientCheck> {
        let digits = Self::recipient(phone)?;
        let raw = self
            .api
            .check_recipient(instance_id, &digits)
            .await
            .map_err(|e| CanonicalError::from_broker(e, NAME))?;
        let body = raw.get("data").filter(|d| d.is_object()).unwrap_or(&raw);

        debug!(instance_id = %instance_id, phone = %digits, "Recipient checked via broker");
        Ok(RecipientCheck {
            exists: truthy(body.get("exists")),
            jid: text_field(body, &["jid"]),
            phone: digits,
            transport: NAME,
        })
    }

    async fn get_status(&self, instance_id: &str) -> TransportOutcome<InstanceStatus> {
        let raw = self
            .api
            .instance_status(instance_id)
            .await
            .map_err(|e| CanonicalError::from_broker(e, NAME))?;
        let body = raw.get("data").filter(|d| d.is_object()).unwrap_or(&raw);

        let status = text_field(body, &["status", "state"])
            .unwrap_or_else(|| "unknown".to_string());
        let connected = body
            .get("connected")
            .map(|v| truthy(Some(v)))
            .unwrap_or_else(|| matches!(status.to_lowercase().as_str(), "connected" | "open"));

        Ok(InstanceStatus {
            instance_id: instance_id.to_string(),
            connected,
            status,
            raw,
            transport: NAME,
        })
    }
}
