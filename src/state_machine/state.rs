//! Conversation state types

use crate::types::{ChatMessage, Role};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between accepted sends
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(750);

/// Where the current exchange stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangePhase {
    /// Ready for input, nothing in flight
    #[default]
    Idle,

    /// Request dispatched, waiting for response headers
    Sending { attempt: u32 },

    /// Non-streaming response arrived, body being read
    AwaitingResponse,

    /// Event-stream response arrived, tokens flowing into the draft
    Streaming,
}

/// Location of the bot message currently being assembled from tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftKey {
    pub index: usize,
    pub id: String,
}

/// Conversation state owned by the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct ConvState {
    pub session_id: String,
    /// Append-only log; only the draft entry is ever rewritten
    pub messages: Vec<ChatMessage>,
    pub phase: ExchangePhase,
    /// Bumped whenever an exchange starts or is abandoned. Exchange events
    /// carrying any other value are stale.
    pub generation: u64,
    pub draft: Option<DraftKey>,
    pub last_accepted_send: Option<Instant>,
}

impl ConvState {
    pub fn new(session_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            phase: ExchangePhase::Idle,
            generation: 0,
            draft: None,
            last_accepted_send: None,
        }
    }

    /// Typing indicator
    pub fn is_pending(&self) -> bool {
        self.phase != ExchangePhase::Idle
    }

    pub fn draft_message(&self) -> Option<&ChatMessage> {
        let key = self.draft.as_ref()?;
        self.messages
            .get(key.index)
            .filter(|m| m.id == key.id && m.role == Role::Bot)
    }
}

/// Context for a conversation (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub debounce: Duration,
}

impl Default for ConvContext {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_WINDOW,
        }
    }
}
