//! API request and response types

use crate::dispatcher::Submitted;
use crate::session::ChatTurn;
use crate::warehouse::AnswerFunction;
use serde::{Deserialize, Serialize};

/// Request to start a session
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub function: Option<AnswerFunction>,
}

/// Request to submit a question
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Connectivity and service status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<&'static str>,
    pub sessions: usize,
}

/// A session and its history
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub function: AnswerFunction,
    pub turns: Vec<ChatTurn>,
    pub busy: bool,
}

/// Response for a completed exchange
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user: ChatTurn,
    pub bot: ChatTurn,
}

impl From<Submitted> for ChatResponse {
    fn from(submitted: Submitted) -> Self {
        Self {
            user: submitted.user,
            bot: submitted.bot,
        }
    }
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
