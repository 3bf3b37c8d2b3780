//! Error types surfaced by sessions.
//!
//! Request failures never show up here: they are recovered by recording a
//! placeholder turn. See [`crate::RequestFailure`].

use std::io;

use thiserror::Error;

use crate::conversation::InvalidTranscript;

/// An operation was invoked in the wrong state or with invalid input.
///
/// The session is left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    /// A request is in flight.
    #[error("a request is already in flight")]
    Busy,
    /// The message is empty or whitespace only.
    #[error("message is empty")]
    EmptyMessage,
    /// The index does not refer to an existing turn.
    #[error("turn {0} does not exist")]
    NoSuchTurn(usize),
    /// Only assistant turns can be edited.
    #[error("turn {0} is not an assistant turn")]
    NotAssistantTurn(usize),
    /// The named configuration field is out of range.
    #[error("`{0}` is out of range")]
    InvalidConfig(&'static str),
}

/// Saving or loading a transcript failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the underlying storage failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The stored data is not a valid transcript.
    #[error("malformed transcript: {0}")]
    Malformed(String),
    /// Nothing is stored under the handle.
    #[error("nothing saved under `{0}`")]
    NotFound(String),
    /// The name cannot be used as a file name.
    #[error("invalid name `{0}`")]
    InvalidName(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        // Syntax errors and transcript invariant violations alike.
        Self::Malformed(err.to_string())
    }
}

impl From<InvalidTranscript> for PersistenceError {
    fn from(err: InvalidTranscript) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// See [`PreconditionViolation`].
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),
    /// See [`PersistenceError`].
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The ticket does not match the request in flight: the session was
    /// reset meanwhile, or the result was already recorded. The result has
    /// been dropped.
    #[error("the request no longer belongs to the session")]
    Discarded,
    /// The chat task has stopped.
    #[error("the chat has been closed")]
    Closed,
}

impl SessionError {
    /// Returns the precondition that was violated, if that is the cause.
    #[inline]
    pub fn precondition(&self) -> Option<PreconditionViolation> {
        match self {
            Self::Precondition(violation) => Some(*violation),
            _ => None,
        }
    }
}
