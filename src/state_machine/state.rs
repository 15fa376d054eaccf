//! Session state types

use crate::session::ChatTurn;
use crate::warehouse::AnswerFunction;
use serde::Serialize;

/// Dispatcher state for one session
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for a question
    #[default]
    Idle,

    /// Query in flight. Holds the user turn already recorded for it.
    Querying { user_turn: ChatTurn },
}

impl SessionState {
    /// Busy gates submission: true exactly while a query is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Querying { .. })
    }
}

/// Immutable per-session configuration
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub function: AnswerFunction,
    /// Bot reply when the answering function returns no rows
    pub fallback_answer: String,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        function: AnswerFunction,
        fallback_answer: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            function,
            fallback_answer: fallback_answer.into(),
        }
    }
}
