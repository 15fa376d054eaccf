//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same new
//! state and effects; all I/O happens in the runtime that executes the effects.

use super::{Effect, Event, SessionContext, SessionState};
use crate::session::ChatTurn;
use crate::warehouse::ExternalAnswer;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons a transition is refused. Refusals never mutate anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Please enter a question.")]
    EmptyInput,
    #[error("A question is already being answered, please wait for it to finish")]
    Busy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Busy gate comes first: the input is disabled while a query runs
        (SessionState::Querying { .. }, Event::UserSubmit { .. }) => Err(TransitionError::Busy),

        (SessionState::Idle, Event::UserSubmit { text }) => {
            let question = text.trim();
            if question.is_empty() {
                return Err(TransitionError::EmptyInput);
            }

            let user_turn = ChatTurn::user(question);
            Ok(TransitionResult::new(SessionState::Querying {
                user_turn: user_turn.clone(),
            })
            .with_effect(Effect::record(user_turn))
            .with_effect(Effect::SetBusy { busy: true })
            .with_effect(Effect::QueryService {
                function: context.function,
                question: question.to_string(),
            }))
        }

        (SessionState::Querying { user_turn }, Event::AnswerReady { answer }) => {
            let bot = answer_turn(answer, &context.fallback_answer);
            Ok(finish(user_turn, bot))
        }

        (SessionState::Querying { user_turn }, Event::AnswerFailed { message, .. }) => {
            let bot = ChatTurn::bot(format!("Error: {message}"));
            Ok(finish(user_turn, bot))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

/// Record the bot turn, clear busy, release the submitter
fn finish(user_turn: &ChatTurn, bot: ChatTurn) -> TransitionResult {
    TransitionResult::new(SessionState::Idle)
        .with_effect(Effect::record(bot.clone()))
        .with_effect(Effect::SetBusy { busy: false })
        .with_effect(Effect::CompleteSubmit {
            user: user_turn.clone(),
            bot,
        })
}

fn answer_turn(answer: Option<ExternalAnswer>, fallback: &str) -> ChatTurn {
    match answer {
        Some(answer) if !answer.response_text.trim().is_empty() => {
            ChatTurn::bot_with_sources(answer.response_text, answer.source_metadata)
        }
        _ => ChatTurn::bot(fallback),
    }
}
