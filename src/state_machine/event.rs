//! Events that can occur in a conversation

use crate::transport::TransportError;
use crate::types::WebhookReply;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Events that trigger state transitions.
///
/// Ids and timestamps are minted by the runtime and carried in the event so
/// the transition stays deterministic.
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserSend {
        text: String,
        message_id: String,
        created_at: DateTime<Utc>,
        at: Instant,
    },
    UserCancel,
    Reset {
        session_id: String,
    },

    // Exchange events, tagged with the generation that started them
    Retrying {
        generation: u64,
        attempt: u32,
    },
    ResponseStarted {
        generation: u64,
        streaming: bool,
    },
    Token {
        generation: u64,
        chunk: String,
        /// Used only if this token opens the draft
        draft_id: String,
        created_at: DateTime<Utc>,
    },
    ExchangeSucceeded {
        generation: u64,
        reply: WebhookReply,
        message_id: String,
        created_at: DateTime<Utc>,
    },
    ExchangeFailed {
        generation: u64,
        error: TransportError,
        message_id: String,
        created_at: DateTime<Utc>,
    },
}

impl Event {
    /// Generation of the exchange that produced this event, if any
    pub fn generation(&self) -> Option<u64> {
        match self {
            Event::Retrying { generation, .. }
            | Event::ResponseStarted { generation, .. }
            | Event::Token { generation, .. }
            | Event::ExchangeSucceeded { generation, .. }
            | Event::ExchangeFailed { generation, .. } => Some(*generation),
            Event::UserSend { .. } | Event::UserCancel | Event::Reset { .. } => None,
        }
    }
}
