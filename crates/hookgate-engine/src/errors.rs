//! Error types for the trigger engine's collaborator traits and executor.

use thiserror::Error;

/// Errors from [`ScriptEngine`](super::traits::ScriptEngine) hooks.
///
/// Every failure mode of a script engine (compile error, runtime throw,
/// sandbox teardown) is flattened into this single shape so the executor's
/// callers see one error type regardless of the engine implementation.
#[derive(Debug, Error)]
#[error("script engine error: {message}")]
pub struct ScriptError {
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors from [`HttpTransport`](super::traits::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network { message: String },
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Errors from [`HistorySink`](super::traits::HistorySink).
#[derive(Debug, Error)]
#[error("history sink error: {message}")]
pub struct HistoryError {
    pub message: String,
}

/// Errors surfaced by a single trigger-URL execution attempt.
///
/// Each URL invocation is isolated: the caller logs the error and moves on
/// to the next URL or trigger, so none of these abort sibling executions.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("auth option should be of the form \"username:password\"")]
    InvalidAuth,
    #[error("the history data must be defined to replay an integration")]
    HistoryDataMissing,
    #[error("the integration's retry delay setting is invalid: {value}")]
    InvalidRetryDelay { value: String },
    #[error(transparent)]
    Script(#[from] ScriptError),
}
