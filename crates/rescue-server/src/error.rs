use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rescue_assignment::AssignmentError;
use rescue_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

use crate::geocoding::GeocodingError;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// No capacity left; the case stays queued.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid",
            ApiError::NotFound(_) => "not-found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::BadGateway(_) => "upstream",
            ApiError::Internal(_) => "exception",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let message = match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Unavailable(m)
            | ApiError::BadGateway(m)
            | ApiError::Internal(m) => m.clone(),
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::warn!(status = self.status_code().as_u16(), error = %self, "request failed");
        }
        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<AssignmentError> for ApiError {
    fn from(e: AssignmentError) -> Self {
        let msg = e.to_string();
        match e {
            AssignmentError::CaseNotFound(_) => ApiError::NotFound(msg),
            AssignmentError::CaseNotPending { .. } | AssignmentError::Conflict { .. } => {
                ApiError::Conflict(msg)
            }
            AssignmentError::NoHospitalAvailable
            | AssignmentError::NoResponderAvailable
            | AssignmentError::TransientStoreError { .. } => ApiError::Unavailable(msg),
            AssignmentError::AssignmentPersistFailed { .. }
            | AssignmentError::CompensationFailed { .. } => ApiError::Internal(msg),
            AssignmentError::Validation(core) if core.is_transition_error() => {
                ApiError::Conflict(msg)
            }
            AssignmentError::Validation(_) => ApiError::BadRequest(msg),
            AssignmentError::Store(storage) => storage.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let msg = e.to_string();
        match e {
            StorageError::NotFound { .. } => ApiError::NotFound(msg),
            StorageError::AlreadyExists { .. }
            | StorageError::InvalidTransition { .. }
            | StorageError::StatusConflict { .. } => ApiError::Conflict(msg),
            StorageError::InvalidRecord { .. } => ApiError::BadRequest(msg),
            ref other if other.is_transient() => ApiError::Unavailable(msg),
            _ => ApiError::Internal(msg),
        }
    }
}

impl From<GeocodingError> for ApiError {
    fn from(e: GeocodingError) -> Self {
        match e {
            GeocodingError::NoMatch(_) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::BadGateway(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_core::{CaseStatus, CoreError};
    use rescue_storage::Entity;

    #[test]
    fn test_assignment_errors_map_to_statuses() {
        let cases = [
            (AssignmentError::NoHospitalAvailable, StatusCode::SERVICE_UNAVAILABLE),
            (AssignmentError::NoResponderAvailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                AssignmentError::CaseNotFound("c-1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                AssignmentError::CaseNotPending {
                    id: "c-1".into(),
                    status: CaseStatus::Assigned,
                },
                StatusCode::CONFLICT,
            ),
            (
                AssignmentError::persist_failed(StorageError::internal("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AssignmentError::from(StorageError::unavailable("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssignmentError::Validation(CoreError::invalid_field("description", "empty")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AssignmentError::Validation(CoreError::InvalidCaseTransition {
                    from: CaseStatus::Pending,
                    to: CaseStatus::Completed,
                }),
                StatusCode::CONFLICT,
            ),
            (
                AssignmentError::from(StorageError::not_found(Entity::Hospital, "h-9")),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_body_shape() {
        let body = serde_json::to_value(ApiError::conflict("taken").body()).unwrap();
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["message"], "taken");
    }
}
