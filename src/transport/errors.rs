//! # Canonical Transport Errors
//!
//! Every transport implementation fails with [`CanonicalError`], whatever
//! went wrong underneath. Callers match on [`ErrorCode`] and never see a
//! reqwest error, a broker body or a sidecar failure directly; the original
//! error is kept as the `cause`.

use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::sidecar::SidecarError;
use super::types::TransportName;
use crate::broker::BrokerClientError;

/// Stable error codes surfaced to transport callers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InstanceNotConnected,
    UnsupportedOperation,
    TransportNotConfigured,
    InvalidRequest,
    Unauthorized,
    NotFound,
    RateLimited,
    Timeout,
    BrokerUnavailable,
    UnknownError,
    /// Code reported by the broker that has no canonical counterpart
    Broker(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InstanceNotConnected => "INSTANCE_NOT_CONNECTED",
            ErrorCode::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorCode::TransportNotConfigured => "TRANSPORT_NOT_CONFIGURED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::BrokerUnavailable => "BROKER_UNAVAILABLE",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::Broker(code) => code,
        }
    }

    /// Parse a code string; unknown codes are kept verbatim
    pub fn parse(code: &str) -> Self {
        let normalized = code.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "INSTANCE_NOT_CONNECTED" => ErrorCode::InstanceNotConnected,
            "UNSUPPORTED_OPERATION" => ErrorCode::UnsupportedOperation,
            "TRANSPORT_NOT_CONFIGURED" => ErrorCode::TransportNotConfigured,
            "INVALID_REQUEST" => ErrorCode::InvalidRequest,
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "NOT_FOUND" => ErrorCode::NotFound,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "TIMEOUT" => ErrorCode::Timeout,
            "BROKER_UNAVAILABLE" => ErrorCode::BrokerUnavailable,
            "UNKNOWN_ERROR" | "" => ErrorCode::UnknownError,
            _ => ErrorCode::Broker(code.trim().to_string()),
        }
    }

    /// Code for an HTTP status when the broker gave none
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCode::InvalidRequest,
            401 | 403 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            408 | 504 => ErrorCode::Timeout,
            429 => ErrorCode::RateLimited,
            500..=599 => ErrorCode::BrokerUnavailable,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Human-readable descriptor for the code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InstanceNotConnected => "WhatsApp instance is not connected",
            ErrorCode::UnsupportedOperation => "Operation not supported by the active transport",
            ErrorCode::TransportNotConfigured => "No WhatsApp transport is configured",
            ErrorCode::InvalidRequest => "Request rejected as invalid",
            ErrorCode::Unauthorized => "Broker rejected the credentials",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::RateLimited => "Rate limit exceeded",
            ErrorCode::Timeout => "Request timed out",
            ErrorCode::BrokerUnavailable => "Broker is unavailable",
            ErrorCode::UnknownError => "Unexpected transport failure",
            ErrorCode::Broker(_) => "Broker reported an error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Uniform error raised by every transport
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalError {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    pub transport: TransportName,
    #[serde(skip)]
    pub cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl CanonicalError {
    pub fn new(code: ErrorCode, message: impl Into<String>, transport: TransportName) -> Self {
        Self {
            code,
            status: None,
            request_id: None,
            message: message.into(),
            transport,
            cause: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Raised when the active mode has no usable transport
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TransportNotConfigured,
            message,
            TransportName::None,
        )
    }

    pub fn instance_not_connected(instance_id: &str, transport: TransportName) -> Self {
        Self::new(
            ErrorCode::InstanceNotConnected,
            format!("Instance '{instance_id}' is not connected"),
            transport,
        )
    }

    pub fn unsupported(operation: &str, transport: TransportName) -> Self {
        Self::new(
            ErrorCode::UnsupportedOperation,
            format!("{operation} is not supported by the {transport} transport"),
            transport,
        )
    }

    pub fn invalid_request(message: impl Into<String>, transport: TransportName) -> Self {
        Self::new(ErrorCode::InvalidRequest, message, transport)
    }

    /// Translate a broker client failure, keeping code, status and request id
    pub fn from_broker(err: BrokerClientError, transport: TransportName) -> Self {
        let code = match &err {
            BrokerClientError::Http { status, code, .. } => code
                .as_deref()
                .map(ErrorCode::parse)
                .unwrap_or_else(|| ErrorCode::from_http_status(*status)),
            BrokerClientError::Request { timed_out: true, .. } => ErrorCode::Timeout,
            BrokerClientError::Request { .. } => ErrorCode::BrokerUnavailable,
            BrokerClientError::Configuration { .. } => ErrorCode::TransportNotConfigured,
            BrokerClientError::Decode { .. } => ErrorCode::UnknownError,
        };
        let message = match &err {
            BrokerClientError::Http { message, .. }
            | BrokerClientError::Request { message, .. }
            | BrokerClientError::Decode { message, .. }
            | BrokerClientError::Configuration { message } => message.clone(),
        };

        Self {
            code,
            status: err.status(),
            request_id: err.request_id().map(str::to_string),
            message,
            transport,
            cause: Some(Arc::new(err)),
        }
    }

    pub fn from_sidecar(err: SidecarError) -> Self {
        let code = match &err {
            SidecarError::NotConnected { .. } => ErrorCode::InstanceNotConnected,
            SidecarError::UnknownInstance { .. } => ErrorCode::NotFound,
            SidecarError::Rejected { .. } => ErrorCode::InvalidRequest,
            SidecarError::Failed { .. } => ErrorCode::UnknownError,
        };
        Self::new(code, err.to_string(), TransportName::Sidecar).with_cause(err)
    }

    /// Descriptor for this error's code
    pub fn description(&self) -> &'static str {
        self.code.description()
    }
}

impl fmt::Debug for CanonicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalError")
            .field("code", &self.code)
            .field("status", &self.status)
            .field("request_id", &self.request_id)
            .field("message", &self.message)
            .field("transport", &self.transport)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for CanonicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] (transport: {}",
            self.code.description(),
            self.message,
            self.code,
            self.transport
        )?;
        if let Some(status) = self.status {
            write!(f, ", status: {status}")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, ", request id: {request_id}")?;
        }
        f.write_str(")")
    }
}

impl StdError for CanonicalError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

pub type TransportOutcome<T> = Result<T, CanonicalError>;
