//! Per-session chat history and busy flag
//!
//! The store is append-only for the lifetime of a session. It is owned by the
//! session runtime, which is its only writer; everything else reads snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// A single chat bubble. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    sender: Sender,
    content: String,
    /// Extra columns returned alongside a bot answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_metadata: Option<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Sender::Bot, content)
    }

    pub fn bot_with_sources(
        content: impl Into<String>,
        source_metadata: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            source_metadata,
            ..Self::new(Sender::Bot, content)
        }
    }

    fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            source_metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

}

/// Flags gating the input controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    pub busy: bool,
}

/// Read-only view of a session used for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub turns: Vec<ChatTurn>,
    pub busy: bool,
    /// Sequence number of the last turn included; 0 when empty
    pub last_seq: usize,
}

/// Ordered chat history plus session flags
#[derive(Debug, Default)]
pub struct SessionStore {
    history: Vec<ChatTurn>,
    flags: SessionFlags,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a turn to the end of the history and return its sequence number
    pub fn append(&mut self, turn: ChatTurn) -> usize {
        self.history.push(turn);
        self.last_seq()
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.flags.busy = busy;
    }

    pub fn is_busy(&self) -> bool {
        self.flags.busy
    }

    /// Turns are numbered from 1 in append order, so the last sequence number
    /// is the history length
    pub fn last_seq(&self) -> usize {
        self.history.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.history.clone(),
            busy: self.is_busy(),
            last_seq: self.last_seq(),
        }
    }
}

/// Session store shared between the runtime (writer) and HTTP handlers (readers)
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionStore>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionStore::new())),
        }
    }

    pub async fn append(&self, turn: ChatTurn) -> usize {
        self.inner.write().await.append(turn)
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.read().await.is_busy()
    }

    pub async fn set_busy(&self, busy: bool) {
        self.inner.write().await.set_busy(busy);
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.snapshot()
    }
}
