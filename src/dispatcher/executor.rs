//! Session runtime executor

use super::traits::AnswerClient;
use super::{Command, DispatchError, SseEvent, Submitted};
use crate::session::SharedSession;
use crate::state_machine::{
    transition, Effect, Event, SessionContext, SessionState, TransitionError, TransitionResult,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type Reply = oneshot::Sender<Result<Submitted, DispatchError>>;

/// Runtime owning one session. It is the only writer of the session store and
/// processes commands one at a time; the answering call runs in a background
/// task and re-enters as an event.
pub struct SessionRuntime<C>
where
    C: AnswerClient + 'static,
{
    context: SessionContext,
    state: SessionState,
    session: SharedSession,
    client: Arc<C>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    /// Submitter waiting for the outstanding query to finish
    pending_reply: Option<Reply>,
    shutdown: CancellationToken,
}

impl<C> SessionRuntime<C>
where
    C: AnswerClient + 'static,
{
    pub fn new(
        context: SessionContext,
        session: SharedSession,
        client: C,
        command_rx: mpsc::Receiver<Command>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(8);
        Self {
            context,
            state: SessionState::Idle,
            session,
            client: Arc::new(client),
            command_rx,
            event_rx,
            event_tx,
            broadcast_tx,
            pending_reply: None,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.context.session_id,
            function = %self.context.function,
            "Starting session runtime"
        );

        // Once shutdown is requested no new commands are taken, but an
        // outstanding query still runs to completion before the loop exits.
        let mut closing = false;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled(), if !closing => {
                    closing = true;
                    if !self.state.is_busy() {
                        break;
                    }
                    tracing::info!(
                        session_id = %self.context.session_id,
                        "Session ending after outstanding query"
                    );
                }

                Some(event) = self.event_rx.recv() => {
                    self.process_event(event).await;
                    if closing && !self.state.is_busy() {
                        break;
                    }
                }

                Some(command) = self.command_rx.recv(), if !closing => {
                    self.handle_command(command).await;
                }

                else => break,
            }
        }

        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Err(DispatchError::SessionClosed));
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, reply } => {
                match transition(&self.state, &self.context, Event::submit(text)) {
                    Ok(result) => {
                        self.pending_reply = Some(reply);
                        self.apply(result).await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            session_id = %self.context.session_id,
                            reason = %e,
                            "Submit rejected"
                        );
                        if e == TransitionError::EmptyInput {
                            let _ = self.broadcast_tx.send(SseEvent::Warning {
                                message: e.to_string(),
                            });
                        }
                        let _ = reply.send(Err(DispatchError::Rejected(e)));
                    }
                }
            }
        }
    }

    async fn process_event(&mut self, event: Event) {
        match transition(&self.state, &self.context, event) {
            Ok(result) => self.apply(result).await,
            Err(e) => {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Dropped event");
            }
        }
    }

    async fn apply(&mut self, result: TransitionResult) {
        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect).await;
        }
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RecordTurn { turn } => {
                let seq = self.session.append(turn.clone()).await;
                tracing::debug!(
                    session_id = %self.context.session_id,
                    seq,
                    sender = ?turn.sender(),
                    chars = turn.content().len(),
                    "Turn recorded"
                );
                let _ = self.broadcast_tx.send(SseEvent::Turn { seq, turn });
            }

            Effect::SetBusy { busy } => {
                self.session.set_busy(busy).await;
                let _ = self.broadcast_tx.send(SseEvent::Busy { busy });
            }

            Effect::QueryService { function, question } => {
                let client = self.client.clone();
                let event_tx = self.event_tx.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        session_id = %session_id,
                        function = %function,
                        "Querying answering service"
                    );

                    let event = match client.answer(function, &question).await {
                        Ok(answer) => Event::AnswerReady { answer },
                        Err(e) => {
                            tracing::warn!(
                                session_id = %session_id,
                                kind = e.kind.as_str(),
                                error = %e.message,
                                "Answering service failed"
                            );
                            Event::AnswerFailed {
                                message: e.message,
                                kind: e.kind,
                            }
                        }
                    };

                    // The runtime holds a sender, so this only fails if it is gone
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::CompleteSubmit { user, bot } => {
                if let Some(reply) = self.pending_reply.take() {
                    let _ = reply.send(Ok(Submitted { user, bot }));
                }
            }
        }
    }
}
