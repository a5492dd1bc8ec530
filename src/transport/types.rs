//! Request and result types shared by every transport implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which implementation produced a result or error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportName {
    Http,
    Sidecar,
    DryRun,
    /// Raised before any implementation was selected
    None,
}

impl TransportName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportName::Http => "http",
            TransportName::Sidecar => "sidecar",
            TransportName::DryRun => "dryrun",
            TransportName::None => "none",
        }
    }
}

impl fmt::Display for TransportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound text message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    pub instance_id: String,
    pub to: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

impl SendTextRequest {
    pub fn new(
        instance_id: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            to: to.into(),
            text: text.into(),
            quoted_message_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Outbound media message, referenced by URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    pub instance_id: String,
    pub to: String,
    pub media_type: MediaKind,
    pub media_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl SendMediaRequest {
    pub fn new(
        instance_id: impl Into<String>,
        to: impl Into<String>,
        media_type: MediaKind,
        media_url: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            to: to.into(),
            media_type,
            media_url: media_url.into(),
            caption: None,
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Outcome of a send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportResult {
    pub external_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub raw: Value,
    pub transport: TransportName,
}

/// Whether a phone number is reachable on WhatsApp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientCheck {
    pub phone: String,
    pub exists: bool,
    pub jid: Option<String>,
    pub transport: TransportName,
}

/// Connection state of a WhatsApp instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub instance_id: String,
    pub connected: bool,
    pub status: String,
    pub raw: Value,
    pub transport: TransportName,
}

/// Strip everything but digits from a phone number
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+55 (11) 98765-4321"), "5511987654321");
        assert_eq!(normalize_phone("5511@s.whatsapp.net"), "5511");
        assert_eq!(normalize_phone("abc"), "");
    }

    #[test]
    fn test_transport_name_wire_format() {
        assert_eq!(serde_json::to_value(TransportName::DryRun).unwrap(), "dryrun");
        assert_eq!(TransportName::Sidecar.to_string(), "sidecar");
    }
}
