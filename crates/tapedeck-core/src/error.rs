//! Error types for the Tapedeck orchestration core

use thiserror::Error;

/// Result type alias for Tapedeck operations
pub type DeckResult<T> = Result<T, DeckError>;

/// Main error type for the Tapedeck core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeckError {
    /// Entry label could not be resolved before dispatch
    #[error("Unknown entry document: {0}")]
    UnknownEntry(String),

    /// A document label collides with an existing one
    #[error("Duplicate document label: {0}")]
    DuplicateLabel(String),

    /// An operation was requested while another was in flight
    #[error("Session is busy: {0}")]
    Busy(String),

    /// Compilation failed
    #[error("Compile error: {0}")]
    Compile(String),

    /// Program execution failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The worker channel is gone or refused the message
    #[error("Worker channel error: {0}")]
    Channel(String),

    /// Invalid input from the host
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// The operation was cancelled by a worker restart
    #[error("Operation was cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl DeckError {
    /// Create a new unknown-entry error
    pub fn unknown_entry(label: impl Into<String>) -> Self {
        Self::UnknownEntry(label.into())
    }

    /// Create a new busy error
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy(message.into())
    }

    /// Create a new compile error
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create a new runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Create a new channel error
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for DeckError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
