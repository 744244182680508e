//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock rules, state transitions). Every failing operation leaves the records
/// it touched unchanged, so callers can retry or correct the request freely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed or out-of-range input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Not enough available stock to satisfy a reservation.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// A stock invariant would be violated or a state transition is illegal.
    ///
    /// Unlike the other variants this usually points at a bug or concurrent
    /// misuse, and should be logged as unexpected.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A stale version was supplied for an optimistic update.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The acting principal lacks a required capability.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Stable machine-readable code (used by transport layers for error bodies).
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::Forbidden(_) => "forbidden",
        }
    }

    /// `true` for failures a well-behaved caller can run into during normal use.
    pub fn is_expected(&self) -> bool {
        !matches!(self, DomainError::InvalidState(_))
    }
}
