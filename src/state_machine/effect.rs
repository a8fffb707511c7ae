//! Effects produced by state transitions

use crate::types::ChatMessage;

/// Change notification for whatever renders the conversation
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    MessageAppended(ChatMessage),
    /// The draft's text changed in place
    MessageUpdated(ChatMessage),
    /// An unfinished draft was dropped
    MessageRemoved { id: String },
    PendingChanged(bool),
    HistoryCleared { session_id: String },
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start talking to the webhook for this generation
    StartExchange { generation: u64, text: String },

    /// Abort whatever exchange is in flight
    AbortExchange,

    /// Write the full history through to storage
    PersistHistory,

    /// Notify subscribers
    Notify(ChatUpdate),
}

impl Effect {
    pub fn appended(message: ChatMessage) -> Self {
        Effect::Notify(ChatUpdate::MessageAppended(message))
    }

    pub fn updated(message: ChatMessage) -> Self {
        Effect::Notify(ChatUpdate::MessageUpdated(message))
    }

    pub fn removed(id: impl Into<String>) -> Self {
        Effect::Notify(ChatUpdate::MessageRemoved { id: id.into() })
    }

    pub fn pending(pending: bool) -> Self {
        Effect::Notify(ChatUpdate::PendingChanged(pending))
    }
}
