//! Matching engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the admission coordinator and its collaborators.
///
/// `RejectedFok` and STP cancellation are not modeled as errors: an FOK
/// rejection is a successful admission with a terminal status, and STP
/// cancellation never reaches the caller as a `Result::Err` at all.
#[derive(Error, Debug)]
pub enum MatchingError {
    /// Malformed instrument id, user id, side, price, or volume.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cancel referenced an id that is not resting on the book.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown instrument requested of the product manager.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// An audit sink considered primary (the file sink) failed to persist
    /// an event. This is fatal: the hash chain's integrity can no longer
    /// be guaranteed to match what was durably written.
    #[error("audit sink failure: {0}")]
    SinkFailure(String),

    /// An internal consistency check failed (volume accounting, a missing
    /// price level, a hash mismatch on append). Always a defect, never a
    /// consequence of caller input.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Catch-all for errors from collaborators outside this crate's taxonomy.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MatchingError>;

impl MatchingError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn unknown_instrument(msg: impl Into<String>) -> Self {
        Self::UnknownInstrument(msg.into())
    }

    pub fn sink_failure(msg: impl Into<String>) -> Self {
        Self::SinkFailure(msg.into())
    }

    /// A defect that does not fit one of the named kinds above but is
    /// still this crate's own fault rather than caller input.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Wraps an error from a collaborator outside this crate's taxonomy.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(msg.into()))
    }
}
