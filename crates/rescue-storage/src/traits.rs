//! Store traits for the emergency response coordinator.
//!
//! The traits only describe the read/write contracts the services need.
//! Implementations must be thread-safe (`Send + Sync`) and must never
//! overwrite a hospital's `available` count or a responder's status without
//! checking the caller's expected value first.

use async_trait::async_trait;
use rescue_core::{
    CaseStatus, EmergencyCase, EmergencyResponder, Hospital, ResponderStatus, StaffRole,
    VerificationCode,
};

use crate::error::StorageError;
use crate::types::WriteOutcome;

/// Hospital capacity and responder availability, plus the case assignment
/// write that the assignment engine performs last.
///
/// # Example
///
/// ```ignore
/// use rescue_storage::{CapacityStore, StorageError};
///
/// async fn nearest_candidates(store: &dyn CapacityStore) -> Result<usize, StorageError> {
///     let hospitals = store.list_hospitals_with_availability(1).await?;
///     Ok(hospitals.len())
/// }
/// ```
#[async_trait]
pub trait CapacityStore: Send + Sync {
    // ==================== Hospitals ====================

    /// Lists hospitals whose `available` count is at least `min_available`,
    /// ordered by id.
    async fn list_hospitals_with_availability(
        &self,
        min_available: u32,
    ) -> Result<Vec<Hospital>, StorageError>;

    /// Reads a hospital by id.
    async fn get_hospital(&self, id: &str) -> Result<Option<Hospital>, StorageError>;

    /// Registers a hospital.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    /// Returns `StorageError::InvalidRecord` if the capacity is inconsistent.
    async fn insert_hospital(&self, hospital: Hospital) -> Result<Hospital, StorageError>;

    /// Sets `available` to `new_available` if it currently equals
    /// `expected_available`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the hospital does not exist.
    /// Returns `StorageError::InvalidRecord` if `new_available` exceeds the
    /// hospital's total beds.
    async fn update_hospital_availability(
        &self,
        id: &str,
        expected_available: u32,
        new_available: u32,
    ) -> Result<WriteOutcome, StorageError>;

    /// Claims one bed: `expected_available -> expected_available - 1`.
    ///
    /// An expectation of zero can never be applied and is reported as a
    /// conflict.
    async fn reserve_hospital_bed(
        &self,
        id: &str,
        expected_available: u32,
    ) -> Result<WriteOutcome, StorageError> {
        match expected_available.checked_sub(1) {
            Some(next) => {
                self.update_hospital_availability(id, expected_available, next)
                    .await
            }
            None => Ok(WriteOutcome::conflict(expected_available)),
        }
    }

    // ==================== Responders ====================

    /// Lists responders with the given status, ordered by id.
    async fn list_responders(
        &self,
        status: ResponderStatus,
    ) -> Result<Vec<EmergencyResponder>, StorageError>;

    /// Reads a responder by id.
    async fn get_responder(&self, id: &str) -> Result<Option<EmergencyResponder>, StorageError>;

    /// Registers a responder.
    async fn insert_responder(
        &self,
        responder: EmergencyResponder,
    ) -> Result<EmergencyResponder, StorageError>;

    /// Sets the status to `new_status` if it currently equals
    /// `expected_status`, refreshing `last_update`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the responder does not exist.
    async fn update_responder_status(
        &self,
        id: &str,
        expected_status: ResponderStatus,
        new_status: ResponderStatus,
    ) -> Result<WriteOutcome, StorageError>;

    /// Claims a responder: `expected_status -> assigned`.
    async fn reserve_responder(
        &self,
        id: &str,
        expected_status: ResponderStatus,
    ) -> Result<WriteOutcome, StorageError> {
        self.update_responder_status(id, expected_status, ResponderStatus::Assigned)
            .await
    }

    // ==================== Case assignment ====================

    /// Marks a pending case as `assigned` to the given hospital and responder.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the case does not exist.
    /// Returns `StorageError::InvalidTransition` if the case is no longer pending.
    async fn update_case_assignment(
        &self,
        case_id: &str,
        hospital_id: &str,
        responder_id: &str,
    ) -> Result<EmergencyCase, StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Case submission and staff-driven lifecycle updates.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Stores a newly reported case.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn create_case(&self, case: EmergencyCase) -> Result<EmergencyCase, StorageError>;

    /// Reads a case by id.
    async fn get_case(&self, id: &str) -> Result<Option<EmergencyCase>, StorageError>;

    /// Lists cases, optionally restricted to one status, newest first.
    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
    ) -> Result<Vec<EmergencyCase>, StorageError>;

    /// Moves a case from `expected` to `new_status`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StatusConflict` if the stored status is not `expected`.
    /// Returns `StorageError::InvalidTransition` if the edge is not in the lifecycle.
    async fn update_case_status(
        &self,
        id: &str,
        expected: CaseStatus,
        new_status: CaseStatus,
    ) -> Result<EmergencyCase, StorageError>;
}

/// Single-use verification codes for staff registration.
#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    /// Stores a new code.
    async fn create_code(&self, code: VerificationCode) -> Result<VerificationCode, StorageError>;

    /// Lists codes, newest first.
    async fn list_codes(&self) -> Result<Vec<VerificationCode>, StorageError>;

    /// Atomically removes a code matching `code` and `role`.
    ///
    /// Returns `true` only for the single caller that removed it.
    async fn consume_code(&self, code: &str, role: StaffRole) -> Result<bool, StorageError>;
}
