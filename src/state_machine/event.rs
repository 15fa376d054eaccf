//! Events that can occur in a session

use crate::warehouse::{ExternalAnswer, WarehouseErrorKind};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Raw text from the input box, not yet trimmed
    UserSubmit { text: String },

    /// The answering service returned. `None` means zero rows.
    AnswerReady { answer: Option<ExternalAnswer> },

    /// The answering service call failed
    AnswerFailed {
        message: String,
        kind: WarehouseErrorKind,
    },
}

impl Event {
    pub fn submit(text: impl Into<String>) -> Self {
        Event::UserSubmit { text: text.into() }
    }
}
