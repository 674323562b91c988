use rescue_core::{CaseStatus, CoreError};
use rescue_storage::{Entity, StorageError};
use thiserror::Error;

/// Errors returned by the assignment engine and the case lifecycle.
///
/// The case stays `pending` whenever `assign` fails, so every variant leaves
/// it in the queue for a later attempt.
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("No hospital with a free bed is available")]
    NoHospitalAvailable,

    #[error("No emergency responder is available")]
    NoResponderAvailable,

    #[error("Assignment could not be persisted: {source}")]
    AssignmentPersistFailed { source: StorageError },

    #[error("Store temporarily unavailable: {source}")]
    TransientStoreError { source: StorageError },

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Case {id} is {status}, not pending")]
    CaseNotPending { id: String, status: CaseStatus },

    /// A reservation could not be released. The resource stays claimed until
    /// someone corrects it by hand.
    #[error("Could not release reserved {entity} {id}")]
    CompensationFailed { entity: Entity, id: String },

    /// A conditional edit lost against a concurrent writer.
    #[error("{entity} {id} changed concurrently (now {actual})")]
    Conflict {
        entity: Entity,
        id: String,
        actual: String,
    },

    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error(transparent)]
    Store(StorageError),
}

impl AssignmentError {
    pub fn persist_failed(source: StorageError) -> Self {
        Self::AssignmentPersistFailed { source }
    }

    pub fn compensation_failed(entity: Entity, id: impl Into<String>) -> Self {
        Self::CompensationFailed {
            entity,
            id: id.into(),
        }
    }

    /// The whole operation may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreError { .. })
    }

    /// No candidate was left to reserve.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::NoHospitalAvailable | Self::NoResponderAvailable)
    }
}

impl From<StorageError> for AssignmentError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            Self::TransientStoreError { source: err }
        } else {
            Self::Store(err)
        }
    }
}
