//! Chat runtime executor

use super::{ChatHandle, ChatSnapshot, Command};
use crate::session::SessionStore;
use crate::state_machine::{transition, ChatUpdate, ConvContext, ConvState, Effect, Event};
use crate::transport::{ExchangeObserver, SendOptions, TransportClient, TransportError};
use crate::types::{new_message_id, WebhookReply};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const COMMAND_CAPACITY: usize = 64;
const UPDATE_CAPACITY: usize = 256;

/// Progress reported by a spawned exchange, tagged with its generation
struct ExchangeSignal {
    generation: u64,
    kind: SignalKind,
}

enum SignalKind {
    Retrying { attempt: u32 },
    ResponseStarted { streaming: bool },
    Token(String),
    Settled(Result<WebhookReply, TransportError>),
}

/// Forwards transport callbacks into the runtime's signal channel
struct SignalObserver {
    generation: u64,
    signals: mpsc::UnboundedSender<ExchangeSignal>,
}

impl SignalObserver {
    fn forward(&self, kind: SignalKind) {
        let _ = self.signals.send(ExchangeSignal {
            generation: self.generation,
            kind,
        });
    }
}

impl ExchangeObserver for SignalObserver {
    fn on_token(&self, chunk: &str) {
        self.forward(SignalKind::Token(chunk.to_string()));
    }

    fn on_response(&self, streaming: bool) {
        self.forward(SignalKind::ResponseStarted { streaming });
    }

    fn on_retry(&self, attempt: u32, _delay: Duration, _error: &TransportError) {
        self.forward(SignalKind::Retrying {
            attempt: attempt + 1,
        });
    }
}

/// Single owner of a conversation's state
pub struct ChatRuntime {
    context: ConvContext,
    state: ConvState,
    sessions: SessionStore,
    transport: TransportClient,
    command_rx: mpsc::Receiver<Command>,
    signal_tx: mpsc::UnboundedSender<ExchangeSignal>,
    signal_rx: mpsc::UnboundedReceiver<ExchangeSignal>,
    updates: broadcast::Sender<ChatUpdate>,
    /// Parent of every exchange token; cancelled when the runtime stops
    shutdown: CancellationToken,
    exchange_cancel: Option<CancellationToken>,
}

impl ChatRuntime {
    /// Load the current session and its history, and wire up a handle
    pub fn new(
        context: ConvContext,
        sessions: SessionStore,
        transport: TransportClient,
    ) -> (Self, ChatHandle) {
        let session_id = sessions.get_or_create_session_id();
        let messages = sessions.load_history(&session_id);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        let handle = ChatHandle {
            command_tx,
            updates: updates.clone(),
        };
        let runtime = Self {
            context,
            state: ConvState::new(session_id, messages),
            sessions,
            transport,
            command_rx,
            signal_tx,
            signal_rx,
            updates,
            shutdown: CancellationToken::new(),
            exchange_cancel: None,
        };
        (runtime, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.state.session_id,
            messages = self.state.messages.len(),
            "Starting chat runtime"
        );

        // The runtime holds a signal sender itself, so only the command
        // channel closing ends the loop
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
            }
        }

        self.shutdown.cancel();
        tracing::info!(session_id = %self.state.session_id, "Chat runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => self.apply(Event::UserSend {
                text,
                message_id: new_message_id(),
                created_at: Utc::now(),
                at: Instant::now(),
            }),
            Command::Cancel => self.apply(Event::UserCancel),
            Command::Reset => {
                self.sessions.reset_session();
                let session_id = self.sessions.get_or_create_session_id();
                self.apply(Event::Reset { session_id });
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_signal(&mut self, signal: ExchangeSignal) {
        let ExchangeSignal { generation, kind } = signal;
        let event = match kind {
            SignalKind::Retrying { attempt } => Event::Retrying {
                generation,
                attempt,
            },
            SignalKind::ResponseStarted { streaming } => Event::ResponseStarted {
                generation,
                streaming,
            },
            SignalKind::Token(chunk) => Event::Token {
                generation,
                chunk,
                draft_id: new_message_id(),
                created_at: Utc::now(),
            },
            SignalKind::Settled(Ok(reply)) => Event::ExchangeSucceeded {
                generation,
                reply,
                message_id: new_message_id(),
                created_at: Utc::now(),
            },
            SignalKind::Settled(Err(error)) => Event::ExchangeFailed {
                generation,
                error,
                message_id: new_message_id(),
                created_at: Utc::now(),
            },
        };
        self.apply(event);
    }

    fn apply(&mut self, event: Event) {
        let result = match transition(&self.state, &self.context, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(
                    session_id = %self.state.session_id,
                    generation = self.state.generation,
                    error = %e,
                    "Event rejected"
                );
                return;
            }
        };

        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }

        if !self.state.is_pending() {
            self.exchange_cancel = None;
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StartExchange { generation, text } => self.start_exchange(generation, text),
            Effect::AbortExchange => {
                if let Some(token) = self.exchange_cancel.take() {
                    tracing::info!(
                        session_id = %self.state.session_id,
                        "Aborting exchange in flight"
                    );
                    token.cancel();
                }
            }
            Effect::PersistHistory => {
                self.sessions
                    .save_history(&self.state.session_id, &self.state.messages);
            }
            Effect::Notify(update) => {
                // No subscribers is fine
                let _ = self.updates.send(update);
            }
        }
    }

    fn start_exchange(&mut self, generation: u64, text: String) {
        let cancel = self.shutdown.child_token();
        if let Some(previous) = self.exchange_cancel.replace(cancel.clone()) {
            previous.cancel();
        }

        let transport = self.transport.clone();
        let session_id = self.state.session_id.clone();
        let signals = self.signal_tx.clone();

        tokio::spawn(async move {
            tracing::info!(%session_id, generation, "Starting exchange");
            let started = Instant::now();

            let observer = SignalObserver {
                generation,
                signals: signals.clone(),
            };
            let options = SendOptions {
                cancel: Some(cancel),
                observer: Some(&observer),
            };
            let result = transport.send_message(&text, &session_id, options).await;

            tracing::info!(
                %session_id,
                generation,
                duration_ms = %started.elapsed().as_millis(),
                success = result.is_ok(),
                "Exchange settled"
            );
            let _ = signals.send(ExchangeSignal {
                generation,
                kind: SignalKind::Settled(result),
            });
        });
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            session_id: self.state.session_id.clone(),
            messages: self.state.messages.clone(),
            pending: self.state.is_pending(),
            phase: self.state.phase,
        }
    }
}
