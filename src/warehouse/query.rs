//! Answering-function statements and first-row mapping

use super::types::{ResultSet, Statement};
use super::WarehouseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Column holding the answer text
pub const ANSWER_COLUMN: &str = "RESPONSE";

/// Table-valued answering function a session queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFunction {
    /// Product manuals only
    #[default]
    Docs,
    /// Operational logs only
    Logs,
    /// Manuals and logs together
    Combined,
}

impl AnswerFunction {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Docs => "DOCS_LLM",
            Self::Logs => "DOC_LOGS_LLM",
            Self::Combined => "COMBINED_DOC_LLM",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Docs => "docs",
            Self::Logs => "logs",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for AnswerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docs" | "docs_llm" => Ok(Self::Docs),
            "logs" | "doc_logs_llm" => Ok(Self::Logs),
            "combined" | "combined_doc_llm" => Ok(Self::Combined),
            other => Err(format!(
                "unknown answer function '{other}' (expected docs, logs or combined)"
            )),
        }
    }
}

/// Answer extracted from the first result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalAnswer {
    pub response_text: String,
    /// Remaining columns of the row, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
impl ExternalAnswer {
    /// Answer without metadata
    pub fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            source_metadata: None,
        }
    }
}

/// Build the statement asking `function` about `question`. The question is
/// passed as a bound parameter, never spliced into the SQL text.
pub fn answer_statement(function: AnswerFunction, question: &str) -> Statement {
    Statement::new(format!("SELECT * FROM TABLE({}(?))", function.sql_name())).bind_text(question)
}

/// Statement used to verify connectivity at startup
pub fn ping_statement() -> Statement {
    Statement::new("SELECT CURRENT_DATE")
}

/// Map the first row to an answer. `Ok(None)` means zero rows.
pub fn first_answer(result: &ResultSet) -> Result<Option<ExternalAnswer>, WarehouseError> {
    let Some(row) = result.first_row() else {
        return Ok(None);
    };

    if !row.has_column(ANSWER_COLUMN) {
        return Err(WarehouseError::malformed(format!(
            "result has no {ANSWER_COLUMN} column (columns: {})",
            result.columns.join(", ")
        )));
    }

    let response_text = row.get(ANSWER_COLUMN).unwrap_or_default().to_string();

    let metadata: BTreeMap<String, String> = row
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(ANSWER_COLUMN))
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string())))
        .collect();

    Ok(Some(ExternalAnswer {
        response_text,
        source_metadata: (!metadata.is_empty()).then_some(metadata),
    }))
}
