//! Trait abstractions for dispatcher I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::warehouse::{
    answer_statement, first_answer, AnswerFunction, ExternalAnswer, WarehouseError,
    WarehouseService,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for asking the answering service a question
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Ask `function` about `question`. `Ok(None)` means the service returned
    /// no rows.
    async fn answer(
        &self,
        function: AnswerFunction,
        question: &str,
    ) -> Result<Option<ExternalAnswer>, WarehouseError>;
}

#[async_trait]
impl<T: AnswerClient + ?Sized> AnswerClient for Arc<T> {
    async fn answer(
        &self,
        function: AnswerFunction,
        question: &str,
    ) -> Result<Option<ExternalAnswer>, WarehouseError> {
        (**self).answer(function, question).await
    }
}

/// Client standing in when the warehouse could not be reached at startup.
/// Every call fails with the startup reason.
pub struct UnavailableClient {
    reason: String,
}

impl UnavailableClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AnswerClient for UnavailableClient {
    async fn answer(
        &self,
        _function: AnswerFunction,
        _question: &str,
    ) -> Result<Option<ExternalAnswer>, WarehouseError> {
        Err(WarehouseError::network(self.reason.clone()))
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter running answering functions on a warehouse
pub struct WarehouseAnswerClient {
    warehouse: Arc<dyn WarehouseService>,
}

impl WarehouseAnswerClient {
    pub fn new(warehouse: Arc<dyn WarehouseService>) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl AnswerClient for WarehouseAnswerClient {
    async fn answer(
        &self,
        function: AnswerFunction,
        question: &str,
    ) -> Result<Option<ExternalAnswer>, WarehouseError> {
        let statement = answer_statement(function, question);
        let rows = self.warehouse.execute(&statement).await?;
        first_answer(&rows)
    }
}
