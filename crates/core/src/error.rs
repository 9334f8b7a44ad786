//! Error model shared by every ProtoBase crate.
//!
//! Every layer returns this single `Error` enum rather than defining a parallel
//! hierarchy per crate — see `spec.md` §7 for the kinds this models:
//! `CorruptionError`, `IOError`, `ConflictError`, `ValidationError`,
//! `TimeoutError`, `ExpressionError`, `ClosedError`.

use std::io;
use thiserror::Error;

/// Result alias used throughout ProtoBase.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all ProtoBase operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed WAL frame, missing atom at a pointer, or unparseable payload.
    /// Fatal for the affected read; never retried inside the core.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Backend I/O failure (file, lock, or memory-backend misuse).
    #[error("I/O error: {0}")]
    Io(String),

    /// Commit detected an incompatible root update since the transaction's
    /// snapshot and rebase could not reconcile it.
    #[error("commit conflict: {0}")]
    Conflict(String),

    /// Invalid argument to a public operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A blocking operation exceeded a caller-provided deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Query compile/evaluation failure: unresolved field, type mismatch.
    #[error("expression error: {0}")]
    Expression(String),

    /// Operation attempted on a store or transaction that is already closed.
    #[error("use of closed resource: {0}")]
    Closed(String),
}

impl Error {
    /// Build a [`Error::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Build a [`Error::Io`].
    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }

    /// Build a [`Error::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Build a [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a [`Error::Timeout`].
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Build a [`Error::Expression`].
    pub fn expression(msg: impl Into<String>) -> Self {
        Error::Expression(msg.into())
    }

    /// Build a [`Error::Closed`].
    pub fn closed(msg: impl Into<String>) -> Self {
        Error::Closed(msg.into())
    }

    /// Whether callers may usefully retry the operation that produced this
    /// error (conflicts and timeouts are the only retriable kinds).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Timeout(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corruption(format!("json: {e}"))
    }
}

