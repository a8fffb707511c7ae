//! Runtime for driving a conversation
//!
//! One task owns the [`ConvState`](crate::state_machine::ConvState); user
//! commands and exchange progress are both funneled into it and applied
//! through the reducer in arrival order.

mod executor;

pub use executor::ChatRuntime;

use crate::state_machine::{ChatUpdate, ExchangePhase};
use crate::types::ChatMessage;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Commands accepted by the runtime
pub(crate) enum Command {
    Send(String),
    Cancel,
    Reset,
    Snapshot(oneshot::Sender<ChatSnapshot>),
}

/// Point-in-time view of the conversation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    /// Typing indicator
    pub pending: bool,
    pub phase: ExchangePhase,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Chat runtime has stopped")]
    Closed,
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ChatHandle {
    command_tx: mpsc::Sender<Command>,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatHandle {
    /// Submit user input. Blank input and sends inside the debounce window
    /// are dropped by the runtime.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.command(Command::Send(text.into())).await
    }

    /// Abort the exchange in flight, keeping any partial reply
    pub async fn cancel(&self) -> Result<(), RuntimeError> {
        self.command(Command::Cancel).await
    }

    /// Drop the session and its history and start a fresh one
    pub async fn reset(&self) -> Result<(), RuntimeError> {
        self.command(Command::Reset).await
    }

    pub async fn snapshot(&self) -> Result<ChatSnapshot, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| RuntimeError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    async fn command(&self, command: Command) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::Closed)
    }
}
