//! Error types for the sync engine.

use tally_core::{EntityId, StoreError};
use tally_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from a single handler application.
///
/// A handler failure is isolated: it never aborts other handlers or later
/// envelopes, and it never sends an acknowledgment — the absence of the ACK
/// is what makes the peer retry.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The envelope's `content` did not decode to what the tag promised.
    #[error("undecodable content: {0}")]
    Decode(#[from] ProtocolError),

    /// The entity store rejected the operation; the envelope counts as
    /// not-yet-applied and a resend will reattempt it.
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    /// The change was applied but the acknowledgment could not be
    /// published. The peer will resend and the reapply is a no-op.
    #[error("failed to publish acknowledgment: {0}")]
    Ack(String),
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or broker error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The session is not connected.
    #[error("not connected to broker")]
    NotConnected,

    /// The session was shut down and accepts nothing further.
    #[error("session closed")]
    Closed,

    /// Invalid session state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// An outbound send referenced a record the store does not hold.
    #[error("no record with id {0}")]
    UnknownRecord(EntityId),

    /// An envelope without a known entity kind cannot be mapped to a topic.
    #[error("envelope is not routable: {0}")]
    Unroutable(String),

    /// Wire codec error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Entity store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Isolated handler failure, surfaced through dispatch.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying (usually via reconnect + recovery sweep)
    /// can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}
