//! Pure state transition function

use super::{ConvContext, ConvState, DraftKey, Effect, Event, ExchangePhase};
use crate::transport::TransportError;
use crate::types::{ChatMessage, WebhookReply};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Reasons an event is rejected. None of these reach the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Send dropped, only {elapsed:?} since the last accepted send")]
    Debounced { elapsed: Duration },
    #[error("Stale event from exchange {generation} (live exchange is {live})")]
    StaleExchange { generation: u64, live: u64 },
    #[error("No exchange in flight")]
    NothingInFlight,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs this always produces the same outputs, with no I/O.
/// Events from an exchange other than the live one are rejected before they
/// can touch the state.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if let Some(generation) = event.generation() {
        if generation != state.generation || !state.is_pending() {
            return Err(TransitionError::StaleExchange {
                generation,
                live: state.generation,
            });
        }
    }

    match event {
        Event::UserSend {
            text,
            message_id,
            created_at,
            at,
        } => user_send(state, context, text, message_id, created_at, at),

        Event::UserCancel => {
            if !state.is_pending() {
                return Err(TransitionError::NothingInFlight);
            }
            // A partially streamed draft is kept as-is
            let mut next = state.clone();
            next.generation += 1;
            next.phase = ExchangePhase::Idle;
            next.draft = None;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::AbortExchange)
                .with_effect(Effect::pending(false)))
        }

        Event::Reset { session_id } => {
            let was_pending = state.is_pending();
            let next = ConvState {
                session_id: session_id.clone(),
                messages: Vec::new(),
                phase: ExchangePhase::Idle,
                generation: state.generation + 1,
                draft: None,
                last_accepted_send: state.last_accepted_send,
            };
            let mut result = TransitionResult::new(next);
            if was_pending {
                result = result.with_effect(Effect::AbortExchange);
            }
            result = result.with_effect(Effect::Notify(super::ChatUpdate::HistoryCleared {
                session_id,
            }));
            if was_pending {
                result = result.with_effect(Effect::pending(false));
            }
            Ok(result.with_effect(Effect::PersistHistory))
        }

        Event::Retrying { attempt, .. } => {
            let mut next = state.clone();
            let mut effects = Vec::new();
            next.phase = ExchangePhase::Sending { attempt };
            // The next attempt streams from scratch
            if discard_draft(&mut next, &mut effects) {
                effects.push(Effect::PersistHistory);
            }
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::ResponseStarted { streaming, .. } => {
            let mut next = state.clone();
            next.phase = if streaming {
                ExchangePhase::Streaming
            } else {
                ExchangePhase::AwaitingResponse
            };
            Ok(TransitionResult::new(next))
        }

        Event::Token {
            chunk,
            draft_id,
            created_at,
            ..
        } => token(state, chunk, draft_id, created_at),

        Event::ExchangeSucceeded {
            reply,
            message_id,
            created_at,
            ..
        } => succeed(state, reply, message_id, created_at),

        Event::ExchangeFailed {
            error,
            message_id,
            created_at,
            ..
        } => fail(state, &error, message_id, created_at),
    }
}

fn user_send(
    state: &ConvState,
    context: &ConvContext,
    text: String,
    message_id: String,
    created_at: DateTime<Utc>,
    at: Instant,
) -> Result<TransitionResult, TransitionError> {
    if text.trim().is_empty() {
        return Err(TransitionError::EmptyMessage);
    }
    if let Some(last) = state.last_accepted_send {
        let elapsed = at.saturating_duration_since(last);
        if elapsed < context.debounce {
            return Err(TransitionError::Debounced { elapsed });
        }
    }

    let was_pending = state.is_pending();
    let mut next = state.clone();
    let mut effects = Vec::new();

    // Supersede whatever is in flight
    if was_pending {
        effects.push(Effect::AbortExchange);
        discard_draft(&mut next, &mut effects);
    }

    next.generation += 1;
    next.last_accepted_send = Some(at);
    next.phase = ExchangePhase::Sending { attempt: 1 };

    let message = ChatMessage::user(message_id, text.clone(), created_at);
    next.messages.push(message.clone());
    effects.push(Effect::appended(message));
    if !was_pending {
        effects.push(Effect::pending(true));
    }
    effects.push(Effect::PersistHistory);
    effects.push(Effect::StartExchange {
        generation: next.generation,
        text,
    });

    Ok(TransitionResult::new(next).with_effects(effects))
}

fn token(
    state: &ConvState,
    chunk: String,
    draft_id: String,
    created_at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    if chunk.is_empty() {
        return Ok(TransitionResult::new(state.clone()));
    }

    let mut next = state.clone();
    next.phase = ExchangePhase::Streaming;

    let notify = match next.draft.clone() {
        Some(key) => {
            let Some(draft) = next
                .messages
                .get_mut(key.index)
                .filter(|m| m.id == key.id)
            else {
                return Err(TransitionError::InvalidTransition(format!(
                    "draft {} is missing from history",
                    key.id
                )));
            };
            draft.text.push_str(&chunk);
            Effect::updated(draft.clone())
        }
        None => {
            let draft = ChatMessage::bot(draft_id.clone(), chunk, created_at);
            next.draft = Some(DraftKey {
                index: next.messages.len(),
                id: draft_id,
            });
            next.messages.push(draft.clone());
            Effect::appended(draft)
        }
    };

    Ok(TransitionResult::new(next)
        .with_effect(notify)
        .with_effect(Effect::PersistHistory))
}

fn succeed(
    state: &ConvState,
    reply: WebhookReply,
    message_id: String,
    created_at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    let draft_index = next
        .draft
        .take()
        .filter(|key| next.messages.get(key.index).is_some_and(|m| m.id == key.id))
        .map(|key| key.index);
    match draft_index {
        Some(index) => {
            let message = &mut next.messages[index];
            if message.text != reply.message {
                message.text = reply.message;
                effects.push(Effect::updated(message.clone()));
            }
        }
        None => {
            let message = ChatMessage::bot(message_id, reply.message, created_at);
            next.messages.push(message.clone());
            effects.push(Effect::appended(message));
        }
    }

    next.phase = ExchangePhase::Idle;
    effects.push(Effect::PersistHistory);
    effects.push(Effect::pending(false));
    Ok(TransitionResult::new(next).with_effects(effects))
}

fn fail(
    state: &ConvState,
    error: &TransportError,
    message_id: String,
    created_at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    // Errors never merge into a draft
    discard_draft(&mut next, &mut effects);
    if !error.is_aborted() {
        let message = ChatMessage::error(message_id, error.to_string(), created_at);
        next.messages.push(message.clone());
        effects.push(Effect::appended(message));
    }

    next.phase = ExchangePhase::Idle;
    effects.push(Effect::PersistHistory);
    effects.push(Effect::pending(false));
    Ok(TransitionResult::new(next).with_effects(effects))
}

/// Drop the unfinished draft, if any. Returns whether the log changed.
///
/// A failed, retried or superseded exchange must not leave a partial bot
/// message behind, so the draft is the one entry that can leave the log.
/// Only an explicit cancel keeps partial text.
fn discard_draft(next: &mut ConvState, effects: &mut Vec<Effect>) -> bool {
    let Some(key) = next.draft.take() else {
        return false;
    };
    if next
        .messages
        .get(key.index)
        .is_some_and(|m| m.id == key.id)
    {
        next.messages.remove(key.index);
        effects.push(Effect::removed(key.id));
        return true;
    }
    false
}
