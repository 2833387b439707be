//! Error types for the book engine.

use thiserror::Error;

/// Result type alias for book-engine operations.
pub type Result<T> = std::result::Result<T, BookError>;

/// Main error type for book-engine operations.
///
/// Only structural faults surface here; per-event soft anomalies (unknown
/// or duplicate order ids) are counted in the book stats instead and never
/// abort a replay.
#[derive(Error, Debug, Clone)]
pub enum BookError {
    /// The node pool's free list is empty on Add. Fatal for the
    /// single-venue book; the replay driver halts on it.
    #[error("Order pool exhausted (capacity {0})")]
    PoolExhausted(usize),

    /// Action byte outside the enumerated set.
    #[error("Invalid action: {0}")]
    InvalidAction(u8),

    /// Side byte outside the enumerated set.
    #[error("Invalid side: {0}")]
    InvalidSide(u8),

    /// Decoder-reported structural failure; terminates a replay.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for BookError {
    fn from(err: std::io::Error) -> Self {
        BookError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for BookError {
    fn from(err: serde_json::Error) -> Self {
        BookError::Generic(format!("JSON error: {err}"))
    }
}
