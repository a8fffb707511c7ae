//! Webhook transport
//!
//! Sends one user message to the webhook and brings back a reply, either as a
//! single JSON document or as a stream of raw text chunks. Transient failures
//! are retried with capped quadratic backoff; a cancellation token aborts the
//! request, the body read, and any backoff wait.

mod decode;
mod error;
mod http;
mod retry;

pub use decode::Utf8ChunkDecoder;
pub use error::{TransportError, TransportErrorKind};
pub use http::HttpWebhookPeer;
pub use retry::{RetryPolicy, MAX_ATTEMPTS};

use crate::config::ChatConfig;
use crate::types::{WebhookReply, WebhookRequest};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Hard cap on outgoing message length, in characters
pub const MAX_MESSAGE_CHARS: usize = 8000;

const EVENT_STREAM: &str = "text/event-stream";

/// Raw response from a single attempt
pub struct PeerResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
}

impl PeerResponse {
    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM))
    }
}

/// One HTTP exchange with the webhook. Dropping the returned future aborts it.
#[async_trait]
pub trait WebhookPeer: Send + Sync {
    async fn post(&self, request: &WebhookRequest) -> Result<PeerResponse, TransportError>;

    /// Where requests go, for logging
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: WebhookPeer + ?Sized> WebhookPeer for Arc<T> {
    async fn post(&self, request: &WebhookRequest) -> Result<PeerResponse, TransportError> {
        (**self).post(request).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Progress callbacks for a send in flight
pub trait ExchangeObserver: Send + Sync {
    /// A decoded chunk of a streamed reply, in arrival order
    fn on_token(&self, chunk: &str);

    /// Response headers arrived for the current attempt
    fn on_response(&self, _streaming: bool) {}

    /// `attempt` failed and the next one starts after `delay`
    fn on_retry(&self, _attempt: u32, _delay: Duration, _error: &TransportError) {}
}

#[derive(Default)]
pub struct SendOptions<'a> {
    pub cancel: Option<CancellationToken>,
    /// Streaming is only used when an observer is present to receive tokens
    pub observer: Option<&'a dyn ExchangeObserver>,
}

/// Trim and cap a message before it leaves the client
#[must_use]
pub fn sanitize(input: &str) -> String {
    input.trim().chars().take(MAX_MESSAGE_CHARS).collect()
}

/// Logging wrapper for webhook peers
pub struct LoggingPeer {
    inner: Arc<dyn WebhookPeer>,
}

impl LoggingPeer {
    pub fn new(inner: Arc<dyn WebhookPeer>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl WebhookPeer for LoggingPeer {
    async fn post(&self, request: &WebhookRequest) -> Result<PeerResponse, TransportError> {
        let start = Instant::now();
        let result = self.inner.post(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    endpoint = %self.inner.endpoint(),
                    session_id = %request.session_id,
                    status = response.status.as_u16(),
                    streaming = response.is_event_stream(),
                    duration_ms = %duration.as_millis(),
                    "Webhook responded"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.inner.endpoint(),
                    session_id = %request.session_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Webhook request failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}

/// Retrying, cancellable client on top of a [`WebhookPeer`]
#[derive(Clone)]
pub struct TransportClient {
    /// A missing or broken endpoint is kept as its error and reported on send
    peer: Result<Arc<dyn WebhookPeer>, TransportError>,
    policy: RetryPolicy,
    origin: Option<String>,
    user_id: Option<String>,
}

impl TransportClient {
    pub fn new(peer: Arc<dyn WebhookPeer>) -> Self {
        Self {
            peer: Ok(peer),
            policy: RetryPolicy::default(),
            origin: None,
            user_id: None,
        }
    }

    /// Build the production client: an HTTP peer wrapped in request logging
    pub fn from_config(config: &ChatConfig) -> Self {
        let peer = HttpWebhookPeer::from_config(config).map(|http| {
            let http: Arc<dyn WebhookPeer> = Arc::new(http);
            Arc::new(LoggingPeer::new(http)) as Arc<dyn WebhookPeer>
        });
        if let Err(e) = &peer {
            tracing::warn!(error = %e, "Webhook transport is not configured");
        }
        Self {
            peer,
            policy: RetryPolicy::default(),
            origin: config.origin.clone(),
            user_id: config.user_id.clone(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Sanitize `text`, wrap it in a request for `session_id` and send it.
    ///
    /// # Errors
    ///
    /// Returns the last [`TransportError`] once the attempt budget is spent,
    /// or immediately for configuration errors and cancellation.
    pub async fn send_message(
        &self,
        text: &str,
        session_id: &str,
        options: SendOptions<'_>,
    ) -> Result<WebhookReply, TransportError> {
        let request = WebhookRequest::new(sanitize(text), session_id, Utc::now())
            .with_user_id(self.user_id.clone());
        self.send_request(&request, options).await
    }

    /// Send a prepared request with retry and cancellation.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::send_message`].
    pub async fn send_request(
        &self,
        request: &WebhookRequest,
        options: SendOptions<'_>,
    ) -> Result<WebhookReply, TransportError> {
        let peer = self.peer.as_ref().map_err(Clone::clone)?;
        let cancel = options.cancel.unwrap_or_default();
        let observer = options.observer;

        let mut failures = 0;
        loop {
            let error = match self.attempt(&**peer, request, &cancel, observer).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_aborted() || !e.kind.is_retryable() => return Err(e),
                Err(e) => e,
            };

            failures += 1;
            if failures >= self.policy.max_attempts {
                tracing::warn!(
                    session_id = %request.session_id,
                    attempts = failures,
                    error = %error,
                    "Giving up on webhook"
                );
                return Err(error.into_user_facing(self.origin.as_deref()));
            }

            let delay = self.policy.delay_after(failures);
            tracing::warn!(
                session_id = %request.session_id,
                attempt = failures,
                max_attempts = self.policy.max_attempts,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Webhook attempt failed, retrying"
            );
            if let Some(observer) = observer {
                observer.on_retry(failures, delay, &error);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::aborted()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        peer: &dyn WebhookPeer,
        request: &WebhookRequest,
        cancel: &CancellationToken,
        observer: Option<&dyn ExchangeObserver>,
    ) -> Result<WebhookReply, TransportError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::aborted()),
            result = peer.post(request) => result?,
        };

        if !response.status.is_success() {
            let status = response.status;
            return Err(TransportError::http(
                status.as_u16(),
                format!(
                    "webhook responded with {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let streaming = response.is_event_stream();
        match observer {
            Some(observer) if streaming => {
                observer.on_response(true);
                read_stream(response.body, cancel, observer).await
            }
            _ => {
                if let Some(observer) = observer {
                    observer.on_response(false);
                }
                read_json(response.body, cancel).await
            }
        }
    }
}

async fn next_chunk(
    body: &mut BoxStream<'static, Result<Vec<u8>, TransportError>>,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, TransportError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::aborted()),
        chunk = body.next() => chunk.transpose(),
    }
}

async fn read_stream(
    mut body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
    cancel: &CancellationToken,
    observer: &dyn ExchangeObserver,
) -> Result<WebhookReply, TransportError> {
    let mut decoder = Utf8ChunkDecoder::new();
    let mut full = String::new();

    while let Some(bytes) = next_chunk(&mut body, cancel).await? {
        let chunk = decoder.decode(&bytes);
        if !chunk.is_empty() {
            observer.on_token(&chunk);
            full.push_str(&chunk);
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        observer.on_token(&tail);
        full.push_str(&tail);
    }

    Ok(WebhookReply::text(full))
}

async fn read_json(
    mut body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
    cancel: &CancellationToken,
) -> Result<WebhookReply, TransportError> {
    let mut buf = Vec::new();
    while let Some(bytes) = next_chunk(&mut body, cancel).await? {
        buf.extend_from_slice(&bytes);
    }

    serde_json::from_slice(&buf)
        .map_err(|e| TransportError::invalid_response(format!("Failed to parse webhook reply: {e}")))
}
