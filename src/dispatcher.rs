//! Query dispatcher: one runtime per chat session
//!
//! Each session gets its own [`SessionRuntime`] task. Submits are sent to it
//! over a channel and answered once the exchange completes, so the caller sees
//! the whole request/response as one step.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::session::{ChatTurn, SessionSnapshot, SharedSession};
use crate::state_machine::{SessionContext, TransitionError};
use crate::warehouse::AnswerFunction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Runtime backed by whatever client the manager was built with
pub type SharedRuntime = SessionRuntime<Arc<dyn AnswerClient>>;

/// Commands accepted by a session runtime
#[derive(Debug)]
pub enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<Submitted, DispatchError>>,
    },
}

/// A completed exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submitted {
    pub user: ChatTurn,
    pub bot: ChatTurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session has ended")]
    SessionClosed,
}

/// Events sent to stream subscribers
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        snapshot: SessionSnapshot,
        function: AnswerFunction,
    },
    /// `seq` is the turn's 1-based position in the history
    Turn {
        seq: usize,
        turn: ChatTurn,
    },
    Busy {
        busy: bool,
    },
    /// Transient, user-visible warning (e.g. empty question)
    Warning {
        message: String,
    },
}

/// Settings applied to every new session
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub default_function: AnswerFunction,
    pub fallback_answer: String,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub function: AnswerFunction,
    session: SharedSession,
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    shutdown: CancellationToken,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    /// Submit a question and wait for the exchange to finish
    pub async fn submit(&self, text: impl Into<String>) -> Result<Submitted, DispatchError> {
        self.touch().await;
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;

        let result = response.await.map_err(|_| DispatchError::SessionClosed)?;
        self.touch().await;
        result
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }

    /// Subscribe first, then snapshot, so no update is missed. A turn landing
    /// in between arrives both ways; receivers drop `Turn` events whose `seq`
    /// is at or below the snapshot's `last_seq`.
    pub async fn subscribe(&self) -> (SessionSnapshot, broadcast::Receiver<SseEvent>) {
        let rx = self.broadcast_tx.subscribe();
        (self.session.snapshot().await, rx)
    }

    fn end(&self) {
        self.shutdown.cancel();
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// How long the session has gone unused, or `None` while an open stream
    /// or an outstanding query keeps it in use
    async fn idle_for(&self, now: Instant) -> Option<Duration> {
        if self.broadcast_tx.receiver_count() > 0 || self.session.is_busy().await {
            return None;
        }
        Some(now.saturating_duration_since(*self.last_activity.lock().await))
    }
}

/// Manager for all session runtimes
pub struct SessionManager {
    client: Arc<dyn AnswerClient>,
    settings: DispatchSettings,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn AnswerClient>, settings: DispatchSettings) -> Self {
        Self {
            client,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session, using the default function unless one is given
    pub async fn create(&self, function: Option<AnswerFunction>) -> SessionHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let function = function.unwrap_or(self.settings.default_function);
        let context = SessionContext::new(&id, function, &self.settings.fallback_answer);

        let session = SharedSession::new();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let shutdown = CancellationToken::new();

        let runtime: SharedRuntime = SessionRuntime::new(
            context,
            session.clone(),
            self.client.clone(),
            command_rx,
            broadcast_tx.clone(),
            shutdown.clone(),
        );

        let session_id = id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %session_id, "Session runtime finished");
        });

        let handle = SessionHandle {
            id: id.clone(),
            function,
            session,
            command_tx,
            broadcast_tx,
            shutdown,
            last_activity: Arc::new(Mutex::new(Instant::now())),
        };

        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, DispatchError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(session_id.to_string()))?;
        handle.touch().await;
        Ok(handle)
    }

    pub async fn submit(
        &self,
        session_id: &str,
        text: impl Into<String>,
    ) -> Result<Submitted, DispatchError> {
        self.get(session_id).await?.submit(text).await
    }

    /// End a session. Its history is dropped with the runtime.
    pub async fn end(&self, session_id: &str) -> Result<(), DispatchError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| DispatchError::NotFound(session_id.to_string()))?;
        handle.end();
        tracing::info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// End every session unused for at least `idle_ttl`. Returns how many
    /// were ended.
    pub async fn reap_idle(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        for (id, handle) in self.sessions.read().await.iter() {
            if handle.idle_for(now).await.is_some_and(|idle| idle >= idle_ttl) {
                expired.push(id.clone());
            }
        }

        let mut reaped = 0;
        for id in expired {
            if self.end(&id).await.is_ok() {
                reaped += 1;
            }
        }
        reaped
    }

    /// Periodically reclaim sessions whose page went away without ending them.
    /// Stops once the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, idle_ttl: Duration) {
        let manager = Arc::downgrade(self);
        let period = (idle_ttl / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let reaped = manager.reap_idle(idle_ttl).await;
                if reaped > 0 {
                    let remaining = manager.session_count().await;
                    tracing::info!(
                        reaped,
                        remaining,
                        "Reclaimed idle sessions"
                    );
                }
            }
        });
    }
}
