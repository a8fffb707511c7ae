//! Session identity and conversation history persistence
//!
//! Storage is a write-through mirror of the in-memory conversation. Nothing
//! in here returns an error to the caller: read failures degrade to "nothing
//! stored" and write failures are logged and dropped.

mod store;

pub use store::{KeyValueStore, MemoryStore, SqliteStore, StorageError, StorageResult};

use crate::types::ChatMessage;
use std::sync::Arc;

pub const SESSION_KEY: &str = "chat_session_id";

/// Storage key holding the history of one session
#[must_use]
pub fn history_key(session_id: &str) -> String {
    format!("chat_history_{session_id}")
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Return the stored session id, minting and persisting a new one if absent.
    ///
    /// A failed read yields an id for this run only; the stored one is left
    /// in place so its history is still reachable once storage recovers.
    pub fn get_or_create_session_id(&self) -> String {
        match self.store.get(SESSION_KEY) {
            Ok(Some(existing)) if !existing.is_empty() => return existing,
            Ok(_) => {}
            Err(e) => {
                let session_id = uuid::Uuid::new_v4().to_string();
                tracing::warn!(
                    error = %e,
                    %session_id,
                    "Failed to read session id, using a temporary one"
                );
                return session_id;
            }
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self.store.set(SESSION_KEY, &session_id) {
            tracing::warn!(error = %e, %session_id, "Failed to persist session id");
        } else {
            tracing::info!(%session_id, "Created new chat session");
        }
        session_id
    }

    /// Load the history stored for a session; anything unreadable loads as empty
    pub fn load_history(&self, session_id: &str) -> Vec<ChatMessage> {
        let raw = match self.store.get(&history_key(session_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, %session_id, "Failed to read history");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ChatMessage>>(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, %session_id, "Discarding malformed history");
                Vec::new()
            }
        }
    }

    /// Overwrite the stored history. Failures are swallowed.
    pub fn save_history(&self, session_id: &str, messages: &[ChatMessage]) {
        let result = serde_json::to_string(messages)
            .map_err(StorageError::from)
            .and_then(|json| self.store.set(&history_key(session_id), &json));

        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                %session_id,
                count = messages.len(),
                "Failed to persist history"
            );
        }
    }

    /// Delete the current session id and its history
    pub fn reset_session(&self) {
        match self.store.get(SESSION_KEY) {
            Ok(Some(session_id)) => {
                if let Err(e) = self.store.remove(&history_key(&session_id)) {
                    tracing::warn!(error = %e, %session_id, "Failed to delete history");
                }
                tracing::info!(%session_id, "Resetting chat session");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read session id during reset"),
        }

        if let Err(e) = self.store.remove(SESSION_KEY) {
            tracing::warn!(error = %e, "Failed to delete session id");
        }
    }
}
