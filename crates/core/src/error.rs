//! Error model shared by every layer.

use thiserror::Error;

/// Result type returned by every storage port.
pub type StoreResult<T> = Result<T, StoreError>;

/// Value-level error.
///
/// Keep this focused on deterministic failures (bad identifiers). Infrastructure concerns belong in [`StoreError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Storage-port error.
///
/// Adapters map their driver errors onto these variants; callers in the
/// authorization core treat everything except `Conflict` as fail-closed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The addressed row does not exist.
    #[error("not found")]
    NotFound,

    /// The backing store could not be reached or is in a bad state.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A row could not be mapped onto a domain value.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
