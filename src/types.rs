//! Chat data model and webhook wire types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Bot => write!(f, "bot"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single entry in the conversation log.
///
/// Field names follow the persisted JSON layout (`createdAt`, `isError`,
/// `formatMarkdown`) so stored histories stay readable by other clients of
/// the same storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub format_markdown: bool,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            text: text.into(),
            created_at,
            is_error: false,
            format_markdown: false,
        }
    }

    /// Bot replies are always rendered as markdown
    pub fn bot(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Bot,
            text: text.into(),
            created_at,
            is_error: false,
            format_markdown: true,
        }
    }

    pub fn error(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::System,
            text: text.into(),
            created_at,
            is_error: true,
            format_markdown: false,
        }
    }
}

/// Mint a fresh opaque message id
#[must_use]
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Webhook wire format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    /// ISO-8601 UTC timestamp with millisecond precision
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body POSTed to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub message: String,
    pub session_id: String,
    pub metadata: ChatMetadata,
}

impl WebhookRequest {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            metadata: ChatMetadata {
                timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
                user_id: None,
            },
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.metadata.user_id = user_id;
        self
    }
}

/// Reply from the webhook, either parsed from JSON or assembled from a stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookReply {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl WebhookReply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: None,
        }
    }
}
