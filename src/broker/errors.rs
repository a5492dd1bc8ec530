//! # Broker Client Error Types
//!
//! Errors raised while talking to the remote broker. They keep whatever the
//! broker told us (its own error code, the HTTP status, the request id) so the
//! transport layer can translate them without losing detail.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BrokerClientError {
    #[error("Broker request failed: {message}")]
    Request { message: String, timed_out: bool },

    #[error("Broker responded with HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        request_id: Option<String>,
        message: String,
    },

    #[error("Broker response could not be decoded: {message}")]
    Decode {
        message: String,
        request_id: Option<String>,
    },

    #[error("Broker client configuration error: {message}")]
    Configuration { message: String },
}

impl BrokerClientError {
    /// Create a transport-level request error
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Create an HTTP error with no broker code or request id
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            code: None,
            request_id: None,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build an error from a non-success response
    ///
    /// Understands `{"error": {"code", "message", "requestId"}}`,
    /// `{"code", "message", "requestId"}` and `{"error": "text"}` bodies;
    /// anything else becomes the message verbatim. A request id from the
    /// response headers wins over one found in the body.
    pub fn from_error_response(status: u16, body: &str, header_request_id: Option<String>) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let detail = parsed.as_ref().map(|value| match value.get("error") {
            Some(inner @ Value::Object(_)) => inner,
            _ => value,
        });

        let field = |keys: &[&str]| -> Option<String> {
            let obj = detail?.as_object()?;
            keys.iter()
                .filter_map(|k| obj.get(*k))
                .find_map(crate::events::normalizer::scalar_string)
        };

        let code = field(&["code", "errorCode", "error_code"]);
        let request_id = header_request_id.or_else(|| field(&["requestId", "request_id"]));
        let message = field(&["message", "error", "detail"])
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| format!("HTTP {status}"));

        Self::Http {
            status,
            code,
            request_id,
            message,
        }
    }

    /// Broker-provided error code, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status, if the broker answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Http { request_id, .. } | Self::Decode { request_id, .. } => {
                request_id.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request { timed_out: true, .. })
    }
}

impl From<reqwest::Error> for BrokerClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrokerClientError::timeout(err.to_string())
        } else if err.is_decode() {
            BrokerClientError::Decode {
                message: err.to_string(),
                request_id: None,
            }
        } else if let Some(status) = err.status() {
            BrokerClientError::http_status(status.as_u16(), err.to_string())
        } else if err.is_builder() {
            BrokerClientError::configuration(err.to_string())
        } else {
            BrokerClientError::request(err.to_string())
        }
    }
}

pub type BrokerClientResult<T> = Result<T, BrokerClientError>;
