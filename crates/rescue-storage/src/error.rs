//! Storage error types for the store adapter contract.

use std::fmt;

use rescue_core::CoreError;

use crate::types::Entity;

/// Errors that can occur during store operations.
///
/// Optimistic-concurrency collisions on capacity and responder status are
/// not errors; they come back as [`crate::WriteOutcome::Conflict`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: Entity,
        /// The missing identifier.
        id: String,
    },

    /// A record with the same identity is already stored.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: Entity,
        /// The duplicate identifier.
        id: String,
    },

    /// The record, or the value being written, violates a domain invariant.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of the violation.
        message: String,
    },

    /// The requested lifecycle edge is not allowed.
    #[error("Invalid transition for {entity} {id}: {message}")]
    InvalidTransition {
        /// Kind of record.
        entity: Entity,
        /// Record identifier.
        id: String,
        /// Description of the rejected edge.
        message: String,
    },

    /// A conditional status update found a different status than expected.
    #[error("Status conflict on {entity} {id}: expected {expected}, found {actual}")]
    StatusConflict {
        /// Kind of record.
        entity: Entity,
        /// Record identifier.
        id: String,
        /// Status the caller expected.
        expected: String,
        /// Status actually stored.
        actual: String,
    },

    /// The backend could not be reached.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the I/O failure.
        message: String,
    },

    /// The backend did not answer in time.
    #[error("Store operation timed out: {message}")]
    Timeout {
        /// Operation that timed out.
        message: String,
    },

    /// An internal store error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: Entity, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(
        entity: Entity,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `StatusConflict` error.
    #[must_use]
    pub fn status_conflict(
        entity: Entity,
        id: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::StatusConflict {
            entity,
            id: id.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the failure is transient I/O and the whole
    /// operation may be retried by the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::StatusConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidRecord { .. } | Self::InvalidTransition { .. } => {
                ErrorCategory::Validation
            }
            Self::Unavailable { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        Self::invalid_record(err.to_string())
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Duplicate or stale status.
    Conflict,
    /// Invariant violation.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
