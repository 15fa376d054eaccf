//! Configuration loaded from the environment
//!
//! A `.env` file in the working directory is honored (see `main`), so the
//! warehouse credentials can live next to the binary during development.

use crate::warehouse::AnswerFunction;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Bot reply used when the answering function returns no rows
pub const DEFAULT_FALLBACK_ANSWER: &str = "Sorry, I couldn't find an answer.";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";
const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials and session parameters for the warehouse SQL API
#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub account: String,
    pub token: String,
    /// Value of `X-Snowflake-Authorization-Token-Type`
    pub token_type: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    /// Overrides the account-derived endpoint (proxies, tests)
    pub base_url: Option<String>,
    pub statement_timeout: Duration,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("base_url", &self.base_url)
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let statement_timeout = match get("SNOWFLAKE_STATEMENT_TIMEOUT") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "SNOWFLAKE_STATEMENT_TIMEOUT",
                    reason: format!("'{raw}' is not a number of seconds"),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
        };

        Ok(Self {
            account: get("SNOWFLAKE_ACCOUNT").ok_or(ConfigError::Missing("SNOWFLAKE_ACCOUNT"))?,
            token: get("SNOWFLAKE_TOKEN").ok_or(ConfigError::Missing("SNOWFLAKE_TOKEN"))?,
            token_type: get("SNOWFLAKE_TOKEN_TYPE")
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            warehouse: get("SNOWFLAKE_WAREHOUSE"),
            database: get("SNOWFLAKE_DATABASE"),
            schema: get("SNOWFLAKE_SCHEMA"),
            role: get("SNOWFLAKE_ROLE"),
            base_url: get("SNOWFLAKE_BASE_URL"),
            statement_timeout,
        })
    }

    /// Root URL of the SQL API, without trailing slash
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.snowflakecomputing.com",
                self.account.to_ascii_lowercase().replace('_', "-")
            ),
        }
    }
}

/// HTTP server and dispatcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Answering function used when a session does not pick one
    pub default_function: AnswerFunction,
    pub fallback_answer: String,
    /// Sessions unused for this long are ended
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_function: AnswerFunction::Docs,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("HELPDOCS_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "HELPDOCS_PORT",
                reason: format!("'{raw}' is not a valid port"),
            })?,
            None => defaults.port,
        };

        let default_function = match get("HELPDOCS_FUNCTION") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "HELPDOCS_FUNCTION",
                reason,
            })?,
            None => defaults.default_function,
        };

        let session_idle_timeout = match get("HELPDOCS_SESSION_IDLE_TIMEOUT") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "HELPDOCS_SESSION_IDLE_TIMEOUT",
                        reason: format!("'{raw}' is not a positive number of seconds"),
                    })
                }
            },
            None => defaults.session_idle_timeout,
        };

        Ok(Self {
            port,
            default_function,
            fallback_answer: get("HELPDOCS_FALLBACK_ANSWER").unwrap_or(defaults.fallback_answer),
            session_idle_timeout,
        })
    }
}
