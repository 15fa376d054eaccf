//! Warehouse error types

use thiserror::Error;

/// Warehouse failure with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WarehouseError {
    pub kind: WarehouseErrorKind,
    pub message: String,
}

impl WarehouseError {
    pub fn new(kind: WarehouseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Timeout, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Query, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Malformed, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::ServerError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(WarehouseErrorKind::Unknown, message)
    }
}

/// Error classification, used for logging and display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseErrorKind {
    /// Credentials rejected (401, 403)
    Auth,
    /// Connection failures and transport errors
    Network,
    /// Statement or request exceeded its time limit
    Timeout,
    /// The statement itself failed (syntax, missing function, bad argument)
    Query,
    /// Response did not have the expected shape
    Malformed,
    /// Warehouse-side failure (5xx, 429)
    ServerError,
    Unknown,
}

impl WarehouseErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Query => "query",
            Self::Malformed => "malformed",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}
