//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::transport::TransportError;
use crate::types::{new_message_id, Role, WebhookReply};
use chrono::Utc;
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Test Helpers
// ============================================================================

/// One scripted step. Exchange steps carry how many generations behind the
/// live one they claim to be, so zero targets the live exchange.
#[derive(Debug, Clone)]
enum Step {
    Send { text: String, gap_ms: u64 },
    Cancel,
    Reset,
    Retry { behind: u64 },
    Started { behind: u64, streaming: bool },
    Token { behind: u64, chunk: String },
    Succeed { behind: u64, text: String },
    Fail { behind: u64, aborted: bool },
}

struct Clock {
    now: Instant,
}

impl Clock {
    fn event(&mut self, step: Step, state: &ConvState) -> Event {
        let generation = |behind: u64| state.generation.saturating_sub(behind);
        match step {
            Step::Send { text, gap_ms } => {
                self.now += Duration::from_millis(gap_ms);
                Event::UserSend {
                    text,
                    message_id: new_message_id(),
                    created_at: Utc::now(),
                    at: self.now,
                }
            }
            Step::Cancel => Event::UserCancel,
            Step::Reset => Event::Reset {
                session_id: new_message_id(),
            },
            Step::Retry { behind } => Event::Retrying {
                generation: generation(behind),
                attempt: 2,
            },
            Step::Started { behind, streaming } => Event::ResponseStarted {
                generation: generation(behind),
                streaming,
            },
            Step::Token { behind, chunk } => Event::Token {
                generation: generation(behind),
                chunk,
                draft_id: new_message_id(),
                created_at: Utc::now(),
            },
            Step::Succeed { behind, text } => Event::ExchangeSucceeded {
                generation: generation(behind),
                reply: WebhookReply::text(text),
                message_id: new_message_id(),
                created_at: Utc::now(),
            },
            Step::Fail { behind, aborted } => Event::ExchangeFailed {
                generation: generation(behind),
                error: if aborted {
                    TransportError::aborted()
                } else {
                    TransportError::network("Failed to fetch")
                },
                message_id: new_message_id(),
                created_at: Utc::now(),
            },
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_behind() -> impl Strategy<Value = u64> {
    prop_oneof![4 => Just(0u64), 1 => 1u64..3]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        ("[a-zA-Z ]{0,12}", 0u64..2000).prop_map(|(text, gap_ms)| Step::Send { text, gap_ms }),
        Just(Step::Cancel),
        Just(Step::Reset),
        arb_behind().prop_map(|behind| Step::Retry { behind }),
        (arb_behind(), any::<bool>())
            .prop_map(|(behind, streaming)| Step::Started { behind, streaming }),
        (arb_behind(), "[a-z ,]{0,6}").prop_map(|(behind, chunk)| Step::Token { behind, chunk }),
        (arb_behind(), "[a-z ]{0,10}").prop_map(|(behind, text)| Step::Succeed { behind, text }),
        (arb_behind(), any::<bool>()).prop_map(|(behind, aborted)| Step::Fail { behind, aborted }),
    ]
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn is_valid_state(state: &ConvState) -> bool {
    match &state.draft {
        // A draft only exists mid-exchange and is always the newest entry
        Some(key) => {
            state.is_pending()
                && state.draft_message().is_some()
                && key.index + 1 == state.messages.len()
        }
        None => true,
    }
}

fn effects_are_valid(effects: &[Effect], new_state: &ConvState) -> bool {
    effects.iter().all(|effect| match effect {
        Effect::StartExchange { generation, .. } => *generation == new_state.generation,
        Effect::Notify(ChatUpdate::PendingChanged(pending)) => *pending == new_state.is_pending(),
        _ => true,
    })
}

/// Every settled message from before the event is still there, unchanged
fn settled_messages_survive(before: &ConvState, after: &ConvState) -> bool {
    let draft_id = before.draft.as_ref().map(|k| k.id.as_str());
    before
        .messages
        .iter()
        .filter(|m| Some(m.id.as_str()) != draft_id)
        .all(|m| after.messages.iter().any(|n| n == m))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: Valid state and effects after any sequence of events
    #[test]
    fn prop_transitions_preserve_validity(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let mut state = ConvState::new("sess", vec![]);
        let mut clock = Clock { now: Instant::now() };
        let ctx = ConvContext::default();

        for step in steps {
            let is_reset = matches!(step, Step::Reset);
            let event = clock.event(step, &state);
            if let Ok(result) = transition(&state, &ctx, event) {
                prop_assert!(is_valid_state(&result.new_state), "Invalid state: {:?}", result.new_state);
                prop_assert!(
                    effects_are_valid(&result.effects, &result.new_state),
                    "Invalid effects for state {:?}: {:?}",
                    result.new_state,
                    result.effects
                );
                prop_assert!(result.new_state.generation >= state.generation);
                if !is_reset {
                    prop_assert!(settled_messages_survive(&state, &result.new_state));
                }
                state = result.new_state;
            }
        }
    }

    // Invariant 2: Events from a superseded exchange are rejected
    #[test]
    fn prop_stale_events_rejected(behind in 1u64..3, chunk in "[a-z]{1,6}") {
        let mut state = ConvState::new("sess", vec![]);
        let mut clock = Clock { now: Instant::now() };
        let ctx = ConvContext::default();
        for _ in 0..3 {
            let event = clock.event(Step::Send { text: "go".to_string(), gap_ms: 1000 }, &state);
            state = transition(&state, &ctx, event).unwrap().new_state;
        }

        for step in [
            Step::Token { behind, chunk: chunk.clone() },
            Step::Succeed { behind, text: chunk.clone() },
            Step::Fail { behind, aborted: false },
            Step::Retry { behind },
        ] {
            let event = clock.event(step, &state);
            let result = transition(&state, &ctx, event);
            let is_stale = matches!(result, Err(TransitionError::StaleExchange { .. }));
            prop_assert!(is_stale, "Expected stale rejection, got {:?}", result);
        }
    }

    // Invariant 3: Whitespace-only input never starts an exchange
    #[test]
    fn prop_blank_input_rejected(text in "[ \t\n]{0,10}") {
        let state = ConvState::new("sess", vec![]);
        let event = Event::UserSend {
            text,
            message_id: new_message_id(),
            created_at: Utc::now(),
            at: Instant::now(),
        };
        let result = transition(&state, &ConvContext::default(), event);
        prop_assert_eq!(result.unwrap_err(), TransitionError::EmptyMessage);
    }

    // Invariant 4: A send inside the debounce window is dropped, outside it is accepted
    #[test]
    fn prop_debounce_window(gap_ms in 0u64..1500) {
        let mut clock = Clock { now: Instant::now() };
        let ctx = ConvContext::default();
        let state = ConvState::new("sess", vec![]);
        let first = clock.event(Step::Send { text: "one".to_string(), gap_ms: 0 }, &state);
        let state = transition(&state, &ctx, first).unwrap().new_state;

        let second = clock.event(Step::Send { text: "two".to_string(), gap_ms }, &state);
        let result = transition(&state, &ctx, second);
        if gap_ms < 750 {
            let debounced = matches!(result, Err(TransitionError::Debounced { .. }));
            prop_assert!(debounced);
        } else {
            prop_assert_eq!(result.unwrap().new_state.messages.len(), 2);
        }
    }

    // Invariant 5: Streamed chunks concatenate into exactly one bot message
    #[test]
    fn prop_tokens_concatenate(chunks in proptest::collection::vec("[a-zA-Z ,.]{1,5}", 1..10)) {
        let ctx = ConvContext::default();
        let mut clock = Clock { now: Instant::now() };
        let mut state = ConvState::new("sess", vec![]);
        let send = clock.event(Step::Send { text: "hi".to_string(), gap_ms: 0 }, &state);
        state = transition(&state, &ctx, send).unwrap().new_state;

        for chunk in &chunks {
            let event = clock.event(Step::Token { behind: 0, chunk: chunk.clone() }, &state);
            state = transition(&state, &ctx, event).unwrap().new_state;
        }

        let bots: Vec<_> = state.messages.iter().filter(|m| m.role == Role::Bot).collect();
        prop_assert_eq!(bots.len(), 1);
        prop_assert_eq!(&bots[0].text, &chunks.concat());
    }
}
