//! Data-warehouse access
//!
//! The rest of the crate sees the warehouse as one operation: execute a
//! parameterized statement and get rows back.

mod error;
mod query;
mod snowflake;
mod types;

pub use error::{WarehouseError, WarehouseErrorKind};
pub use query::{answer_statement, first_answer, ping_statement, AnswerFunction, ExternalAnswer};
pub use snowflake::SnowflakeService;
pub use types::{ResultSet, Statement};

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for warehouse backends
#[async_trait]
pub trait WarehouseService: Send + Sync {
    /// Execute one statement and return its rows
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, WarehouseError>;

    /// Identifier used in logs (account name)
    fn name(&self) -> &str;
}

/// Run the connectivity check
pub async fn check_connection(service: &dyn WarehouseService) -> Result<(), WarehouseError> {
    service.execute(&ping_statement()).await.map(|_| ())
}

/// Logging wrapper for warehouse services
pub struct LoggingService {
    inner: Arc<dyn WarehouseService>,
    name: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn WarehouseService>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl WarehouseService for LoggingService {
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, WarehouseError> {
        let start = std::time::Instant::now();
        let result = self.inner.execute(statement).await;
        let duration = start.elapsed();

        match &result {
            Ok(rows) => {
                tracing::info!(
                    warehouse = %self.name,
                    sql = %statement.sql,
                    duration_ms = %duration.as_millis(),
                    rows = rows.row_count(),
                    "Statement completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    warehouse = %self.name,
                    sql = %statement.sql,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "Statement failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
