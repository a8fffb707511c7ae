//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! reducer never performs I/O, it returns effects for the runtime to execute.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{ChatUpdate, Effect};
pub use event::Event;
pub use state::{ConvContext, ConvState, DraftKey, ExchangePhase};
pub use transition::{transition, TransitionError, TransitionResult};
