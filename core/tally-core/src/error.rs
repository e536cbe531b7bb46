//! Error types for the reactive core.
//!
//! Timestamp parse failures are deliberately not represented here: the
//! normalizer degrades them to a display sentinel and they never reach a
//! feed's error path.

use thiserror::Error;

/// All errors a feed can surface to its owning view model.
///
/// Feed-level errors are terminal to the current subscription attempt but
/// never to the process; re-attempting is an explicit caller action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The singleton record is absent at its fixed key.
    #[error("record not found")]
    NotFound,

    /// The live subscription dropped or the service reported a failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Establishing the subscription failed before any delivery.
    #[error("subscription setup failed: {0}")]
    Setup(String),
}

impl FeedError {
    pub fn transport(cause: impl Into<String>) -> FeedError {
        FeedError::Transport(cause.into())
    }

    pub fn setup(cause: impl Into<String>) -> FeedError {
        FeedError::Setup(cause.into())
    }

    /// The underlying cause, without the variant prefix. Used where
    /// display copy supplies its own framing.
    pub fn cause(&self) -> &str {
        match self {
            FeedError::NotFound => "record not found",
            FeedError::Transport(cause) | FeedError::Setup(cause) => cause,
        }
    }
}

/// Convenience alias for results using `FeedError`.
pub type Result<T> = std::result::Result<T, FeedError>;
