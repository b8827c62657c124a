//! Error types for the progression core.

use thiserror::Error;

/// Errors surfaced by the progression engine and its storage backends.
#[derive(Error, Debug)]
pub enum ProgressionError {
    /// Underlying SQLite failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Optimistic update gave up after repeated version conflicts
    #[error("Update conflict on '{key}' after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// Achievement catalog could not be loaded
    #[error("Achievement catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Fact provider could not supply user facts
    #[error("User facts unavailable: {0}")]
    FactsUnavailable(String),

    /// Domain event name not present in the event table
    #[error("Unknown domain event: {0}")]
    UnknownEvent(String),

    /// Domain event payload missing a required field or holding a bad value
    #[error("Invalid payload for event '{event}': {message}")]
    InvalidPayload { event: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store mutex was poisoned by a panicking thread
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl ProgressionError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Conflict { .. }
                | Self::CatalogUnavailable(_)
                | Self::FactsUnavailable(_)
                | Self::LockPoisoned(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;
