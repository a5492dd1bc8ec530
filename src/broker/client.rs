//! # Broker API Client
//!
//! HTTP client for the remote WhatsApp broker. Provides the event fetch used
//! by the poller and the outbound messaging calls used by the HTTP transport.
//! Responses come back as raw JSON; shaping them is the caller's job.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::errors::{BrokerClientError, BrokerClientResult};
use crate::config::BrokerApiConfig;
use crate::transport::types::{SendMediaRequest, SendTextRequest};

/// Source of raw event batches
#[async_trait]
pub trait BrokerEventSource: Send + Sync {
    /// Fetch the next batch after `cursor` (from the beginning when `None`)
    async fn fetch_events(&self, cursor: Option<&str>) -> BrokerClientResult<Value>;
}

/// Outbound messaging operations exposed by the broker
#[async_trait]
pub trait BrokerMessagingApi: Send + Sync {
    async fn send_text(&self, request: &SendTextRequest) -> BrokerClientResult<Value>;

    async fn send_media(&self, request: &SendMediaRequest) -> BrokerClientResult<Value>;

    async fn check_recipient(&self, instance_id: &str, phone: &str) -> BrokerClientResult<Value>;

    async fn instance_status(&self, instance_id: &str) -> BrokerClientResult<Value>;
}

const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "x-correlation-id", "request-id"];

/// reqwest-backed broker client
pub struct HttpBrokerClient {
    client: Client,
    base_url: Url,
    config: BrokerApiConfig,
}

impl std::fmt::Debug for HttpBrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBrokerClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.config.timeout_ms)
            .field("events_path", &self.config.events_path)
            .field("auth_enabled", &!self.config.api_key.is_empty())
            .finish()
    }
}

impl HttpBrokerClient {
    /// Create new broker client with the given configuration
    pub fn new(config: BrokerApiConfig) -> BrokerClientResult<Self> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            BrokerClientError::configuration(format!(
                "Invalid base URL '{}': {}",
                config.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BrokerClientError::configuration(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let mut client_builder = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("wabroker-core/{}", env!("CARGO_PKG_VERSION")));

        if !config.api_key.is_empty() {
            let header_name = if config.api_key_header.is_empty() {
                "X-API-Key"
            } else {
                &config.api_key_header
            };

            let mut default_headers = HeaderMap::new();
            default_headers.insert(
                HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
                    BrokerClientError::configuration(format!("Invalid API key header name: {e}"))
                })?,
                HeaderValue::from_str(&config.api_key).map_err(|e| {
                    BrokerClientError::configuration(format!("Invalid API key: {e}"))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
        }

        let client = client_builder.build().map_err(|e| {
            BrokerClientError::configuration(format!("Failed to create HTTP client: {e}"))
        })?;

        info!(
            base_url = %base_url,
            timeout_ms = config.timeout_ms,
            "Created HttpBrokerClient"
        );

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build an endpoint URL from path segments, percent-encoding each one
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> BrokerClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BrokerClientError::configuration("Base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.into_iter().filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn instance_endpoint(&self, instance_id: &str, rest: &[&str]) -> BrokerClientResult<Url> {
        let segments = ["instances", instance_id].into_iter().chain(rest.iter().copied());
        self.endpoint(segments)
    }

    async fn execute(&self, request: RequestBuilder, operation: &str) -> BrokerClientResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let request_id = request_id_from_headers(response.headers());

        if status.is_success() {
            let body = response.text().await?;
            debug!(operation = %operation, status = status.as_u16(), "Broker request succeeded");
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&body).map_err(|e| BrokerClientError::Decode {
                message: format!("{operation}: {e}"),
                request_id,
            })
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::new());
            let err = BrokerClientError::from_error_response(status.as_u16(), &body, request_id);
            error!(
                operation = %operation,
                status = status.as_u16(),
                code = ?err.code(),
                request_id = ?err.request_id(),
                "Broker request failed"
            );
            Err(err)
        }
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl BrokerEventSource for HttpBrokerClient {
    async fn fetch_events(&self, cursor: Option<&str>) -> BrokerClientResult<Value> {
        let mut url = self.endpoint(self.config.events_path.split('/'))?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }
        debug!(url = %url, cursor = ?cursor, "Fetching broker events");
        self.execute(self.client.get(url), "fetch_events").await
    }
}

#[async_trait]
impl BrokerMessagingApi for HttpBrokerClient {
    async fn send_text(&self, request: &SendTextRequest) -> BrokerClientResult<Value> {
        let url = self.instance_endpoint(&request.instance_id, &["messages", "text"])?;
        let body = json!({
            "to": request.to,
            "text": request.text,
            "quotedMessageId": request.quoted_message_id,
        });
        self.execute(self.client.post(url).json(&body), "send_text")
            .await
    }

    async fn send_media(&self, request: &SendMediaRequest) -> BrokerClientResult<Value> {
        let url = self.instance_endpoint(&request.instance_id, &["messages", "media"])?;
        self.execute(self.client.post(url).json(request), "send_media")
            .await
    }

    async fn check_recipient(&self, instance_id: &str, phone: &str) -> BrokerClientResult<Value> {
        let url = self.instance_endpoint(instance_id, &["recipients", phone])?;
        self.execute(self.client.get(url), "check_recipient").await
    }

    async fn instance_status(&self, instance_id: &str) -> BrokerClientResult<Value> {
        let url = self.instance_endpoint(instance_id, &["status"])?;
        self.execute(self.client.get(url), "instance_status").await
    }
}
