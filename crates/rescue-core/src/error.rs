use thiserror::Error;

use crate::case::CaseStatus;
use crate::responder::ResponderStatus;

/// Core error types for domain validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid capacity: available {available} exceeds total {total}")]
    InvalidCapacity { total: u32, available: u32 },

    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid case transition: {from} -> {to}")]
    InvalidCaseTransition { from: CaseStatus, to: CaseStatus },

    #[error("Invalid responder transition: {from} -> {to}")]
    InvalidResponderTransition {
        from: ResponderStatus,
        to: ResponderStatus,
    },

    #[error("Invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl CoreError {
    /// Create a new InvalidCapacity error
    pub fn invalid_capacity(total: u32, available: u32) -> Self {
        Self::InvalidCapacity { total, available }
    }

    /// Create a new InvalidCoordinate error
    pub fn invalid_coordinate(latitude: f64, longitude: f64) -> Self {
        Self::InvalidCoordinate {
            latitude,
            longitude,
        }
    }

    /// Create a new InvalidField error
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Check if this error describes a rejected lifecycle transition
    pub fn is_transition_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCaseTransition { .. } | Self::InvalidResponderTransition { .. }
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
