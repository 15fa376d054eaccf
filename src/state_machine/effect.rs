//! Effects produced by state transitions

use crate::session::ChatTurn;
use crate::warehouse::AnswerFunction;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a turn to the session history and notify watchers
    RecordTurn { turn: ChatTurn },

    /// Update the busy flag and notify watchers
    SetBusy { busy: bool },

    /// Ask the answering service (spawns as background task)
    QueryService {
        function: AnswerFunction,
        question: String,
    },

    /// Hand the finished exchange back to whoever submitted the question
    CompleteSubmit { user: ChatTurn, bot: ChatTurn },
}

impl Effect {
    pub fn record(turn: ChatTurn) -> Self {
        Effect::RecordTurn { turn }
    }
}
