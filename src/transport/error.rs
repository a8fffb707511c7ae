//! Transport error types

use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Configuration, message)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Http { status }, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidResponse, message)
    }

    pub fn aborted() -> Self {
        Self::new(TransportErrorKind::Aborted, "Request aborted")
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == TransportErrorKind::Aborted
    }

    /// Browsers report a CORS rejection as an opaque fetch failure. Turn that
    /// into something the person running the webhook can act on.
    #[must_use]
    pub fn into_user_facing(self, origin: Option<&str>) -> Self {
        let cross_origin = self.kind == TransportErrorKind::Network
            && (self.message.contains("Failed to fetch") || self.message.contains("CORS"));
        if !cross_origin {
            return self;
        }
        let origin = origin.unwrap_or("this origin");
        Self::new(
            TransportErrorKind::Cors,
            format!("CORS error: your webhook must allow requests from {origin}"),
        )
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Endpoint missing or unusable - fatal
    Configuration,
    /// Non-2xx response - retryable
    Http { status: u16 },
    /// Connection, timeout or body read failure - retryable
    Network,
    /// Network failure caused by a cross-origin rejection
    Cors,
    /// Body could not be read as a reply - retryable
    InvalidResponse,
    /// Cancelled by the caller - never retried, never shown
    Aborted,
}

impl TransportErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Network | Self::InvalidResponse
        )
    }
}
