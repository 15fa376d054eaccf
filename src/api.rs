//! HTTP API for the help-docs chat

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::dispatcher::SessionManager;
use std::sync::Arc;

/// Advice shown next to a failed startup check
pub const CONNECTION_ADVICE: &str =
    "Please check your Snowflake credentials or environment settings.";

/// Outcome of the startup connectivity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Unavailable(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Standing warning displayed while the warehouse is unreachable
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Connected => None,
            Self::Unavailable(reason) => Some(format!("Failed to connect to Snowflake: {reason}")),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub connection: Arc<ConnectionStatus>,
}

impl AppState {
    pub fn new(sessions: SessionManager, connection: ConnectionStatus) -> Self {
        Self {
            sessions: Arc::new(sessions),
            connection: Arc::new(connection),
        }
    }
}
