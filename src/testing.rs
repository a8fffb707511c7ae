//! Mock implementations for testing
//!
//! These mocks enable exercising the transport and runtime without real I/O.

use crate::session::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use crate::transport::{ExchangeObserver, PeerResponse, TransportError, WebhookPeer};
use crate::types::WebhookRequest;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Storage
// ============================================================================

/// Backend where every operation fails
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }
}

/// In-memory backend whose next read can be made to fail once
pub struct FlakyStore {
    inner: MemoryStore,
    fail_next_get: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_next_get: AtomicBool::new(false),
        }
    }

    pub fn fail_next_get(&self) {
        self.fail_next_get.store(true, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.fail_next_get.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("database is locked".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}

// ============================================================================
// Mock Webhook Peer
// ============================================================================

/// Scripted outcome of one attempt
pub enum MockReply {
    Respond {
        status: StatusCode,
        content_type: Option<String>,
        /// Each chunk is emitted after its delay
        chunks: Vec<(Duration, Vec<u8>)>,
    },
    Fail(TransportError),
}

impl MockReply {
    pub fn json(body: &str) -> Self {
        MockReply::Respond {
            status: StatusCode::OK,
            content_type: Some("application/json".to_string()),
            chunks: vec![(Duration::ZERO, body.as_bytes().to_vec())],
        }
    }

    pub fn stream(chunks: Vec<(Duration, &str)>) -> Self {
        MockReply::Respond {
            status: StatusCode::OK,
            content_type: Some("text/event-stream; charset=utf-8".to_string()),
            chunks: chunks
                .into_iter()
                .map(|(delay, text)| (delay, text.as_bytes().to_vec()))
                .collect(),
        }
    }

    pub fn status(code: u16) -> Self {
        MockReply::Respond {
            status: StatusCode::from_u16(code).unwrap(),
            content_type: Some("text/plain".to_string()),
            chunks: vec![(Duration::ZERO, b"error".to_vec())],
        }
    }

    pub fn network(message: &str) -> Self {
        MockReply::Fail(TransportError::network(message))
    }

    pub fn with_content_type(mut self, value: &str) -> Self {
        if let MockReply::Respond { content_type, .. } = &mut self {
            *content_type = Some(value.to_string());
        }
        self
    }
}

/// Mock peer that plays back queued replies
pub struct MockPeer {
    replies: Mutex<VecDeque<MockReply>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<WebhookRequest>>,
    started: Mutex<Vec<Instant>>,
}

impl MockPeer {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn attempts(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// Time between consecutive attempts
    pub fn gaps(&self) -> Vec<Duration> {
        let started = self.started.lock().unwrap();
        started.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn recorded_requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookPeer for MockPeer {
    async fn post(&self, request: &WebhookRequest) -> Result<PeerResponse, TransportError> {
        self.started.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::network("No mock response queued"));

        match reply {
            MockReply::Fail(e) => Err(e),
            MockReply::Respond {
                status,
                content_type,
                chunks,
            } => {
                let body = futures::stream::unfold(chunks.into_iter(), |mut rest| async move {
                    let (delay, bytes) = rest.next()?;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((Ok::<_, TransportError>(bytes), rest))
                })
                .boxed();
                Ok(PeerResponse {
                    status,
                    content_type,
                    body,
                })
            }
        }
    }

    fn endpoint(&self) -> &str {
        "mock://webhook"
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Observer that records every callback
#[derive(Default)]
pub struct RecordingObserver {
    tokens: Mutex<Vec<String>>,
    responses: Mutex<Vec<bool>>,
    retries: Mutex<Vec<u32>>,
}

impl RecordingObserver {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn responses(&self) -> Vec<bool> {
        self.responses.lock().unwrap().clone()
    }

    pub fn retries(&self) -> Vec<u32> {
        self.retries.lock().unwrap().clone()
    }
}

impl ExchangeObserver for RecordingObserver {
    fn on_token(&self, chunk: &str) {
        self.tokens.lock().unwrap().push(chunk.to_string());
    }

    fn on_response(&self, streaming: bool) {
        self.responses.lock().unwrap().push(streaming);
    }

    fn on_retry(&self, attempt: u32, _delay: Duration, _error: &TransportError) {
        self.retries.lock().unwrap().push(attempt);
    }
}
