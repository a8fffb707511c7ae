//! Webhook chat client core
//!
//! A chat conversation backed by a user-configured webhook: a durable session
//! with its message history, a retrying and cancellable transport that can
//! stream replies token by token, and a pure state machine driven by a single
//! runtime task.

pub mod config;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ChatConfig, ConfigError, Theme};
pub use runtime::{ChatHandle, ChatRuntime, ChatSnapshot, RuntimeError};
pub use session::SessionStore;
pub use state_machine::{ChatUpdate, ConvContext};
pub use transport::{TransportClient, TransportError, TransportErrorKind};
pub use types::{ChatMessage, Role};
