//! reqwest-backed webhook peer

use super::{PeerResponse, TransportError, WebhookPeer};
use crate::config::{ChatConfig, ENV_WEBHOOK_URL};
use crate::types::WebhookRequest;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

/// Peer that POSTs to a real webhook endpoint
pub struct HttpWebhookPeer {
    client: Client,
    url: Url,
    api_key: Option<String>,
}

impl HttpWebhookPeer {
    /// Build a peer for the given endpoint.
    ///
    /// `timeout` bounds connecting and each wait for the next body chunk,
    /// never the whole exchange, so a long stream that keeps producing
    /// tokens is not cut off.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparseable URL or if the HTTP
    /// client cannot be constructed.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::configuration(format!("Invalid webhook URL {url:?}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| TransportError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Build a peer from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no webhook URL is configured or it
    /// is invalid.
    pub fn from_config(config: &ChatConfig) -> Result<Self, TransportError> {
        let url = config
            .webhook_url
            .as_deref()
            .ok_or_else(|| TransportError::configuration(format!("Missing {ENV_WEBHOOK_URL}")))?;
        Self::new(url, config.api_key.clone(), config.request_timeout)
    }
}

#[async_trait]
impl WebhookPeer for HttpWebhookPeer {
    async fn post(&self, request: &WebhookRequest) -> Result<PeerResponse, TransportError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                TransportError::network(format!("Connection failed: {e}"))
            } else {
                TransportError::network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))
            })
            .boxed();

        Ok(PeerResponse {
            status,
            content_type,
            body,
        })
    }

    fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}
