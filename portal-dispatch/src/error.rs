use thiserror::Error;

use crate::JobKind;

/// Result type for dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type returned by worker executions
pub type WorkResult<T> = Result<T, WorkError>;

/// Infrastructure errors raised at the dispatcher boundary
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher has been shut down")]
    ShutDown,

    #[error("Workers are already registered")]
    WorkersAlreadySet,

    #[error("Worker '{worker}' accepts {kind} but registers no handler for it")]
    MissingHandler { worker: String, kind: JobKind },

    #[error("Worker '{worker}' registers a handler for {kind} it does not accept")]
    UnexpectedHandler { worker: String, kind: JobKind },

    #[error("Job kind {0} cannot carry a field map")]
    NotMappable(JobKind),

    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("HTTP client error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

impl DispatchError {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Worker execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// Transient failure, re-executed while the retry budget lasts
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Transient failure whose worker area must be wiped before the retry
    #[error("Clean-and-retry error: {0}")]
    CleanAndRetry(String),

    /// Fail immediately, no retry
    #[error("{0}")]
    Terminal(String),
}

impl WorkError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn clean_and_retry(msg: impl Into<String>) -> Self {
        Self::CleanAndRetry(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Whether this error counts against the retry budget
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::CleanAndRetry(_))
    }

    /// Whether the worker area must be wiped before retry accounting
    pub fn needs_clean(&self) -> bool {
        matches!(self, Self::CleanAndRetry(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::CleanAndRetry(msg) | Self::Terminal(msg) => msg,
        }
    }
}

impl From<std::io::Error> for WorkError {
    fn from(err: std::io::Error) -> Self {
        Self::Terminal(err.to_string())
    }
}
