//! Unified error handling for the tracking pipeline.
//!
//! Storage and serialization failures convert via `#[from]`; clock misuse
//! gets its own variant so callers can distinguish a user-flow bug from an
//! I/O problem.

use thiserror::Error;

use crate::clock::RunState;

/// Unified error type for tracklog operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// SQLite-level failure in the local store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Schema migration failure on store open.
    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    /// Draft payload could not be encoded or decoded.
    #[error("draft encoding error: {0}")]
    DraftEncoding(#[from] serde_json::Error),

    /// A clock transition was requested from a state that does not allow it.
    #[error("cannot {action} while {state:?}")]
    ClockTransition {
        action: &'static str,
        state: RunState,
    },

    /// The ingestion worker could not be started or stopped cleanly.
    #[error("ingestion error: {message}")]
    Ingestion { message: String },
}

/// Result type alias for tracklog operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
