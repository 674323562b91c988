//! Case and resource operations driven by patients and staff.

use std::sync::Arc;

use rescue_core::{
    CaseStatus, CoreError, EmergencyCase, EmergencyResponder, Hospital, Location, ResponderStatus,
    Severity,
};
use rescue_storage::{CapacityStore, CaseStore, Entity, StorageError, WriteOutcome};
use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::{Assignment, AssignmentEngine};
use crate::error::AssignmentError;

/// A case as reported by a patient.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub patient_id: String,
    pub description: String,
    pub severity: Severity,
    pub location: Location,
}

/// Result of submitting a case. The case is stored even when assignment
/// fails; it then stays `pending`.
#[derive(Debug)]
pub struct Submission {
    pub case: EmergencyCase,
    pub outcome: Result<Assignment, AssignmentError>,
}

/// Outcome of re-attempting one pending case.
#[derive(Debug)]
pub struct RetryOutcome {
    pub case_id: String,
    pub outcome: Result<Assignment, AssignmentError>,
}

pub struct CaseLifecycle {
    cases: Arc<dyn CaseStore>,
    capacity: Arc<dyn CapacityStore>,
    engine: Arc<AssignmentEngine>,
}

impl CaseLifecycle {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        capacity: Arc<dyn CapacityStore>,
        engine: Arc<AssignmentEngine>,
    ) -> Self {
        Self {
            cases,
            capacity,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<AssignmentEngine> {
        &self.engine
    }

    /// Stores a new pending case and runs assignment for it right away.
    pub async fn submit(&self, new_case: NewCase) -> Result<Submission, AssignmentError> {
        let case = EmergencyCase::new(
            new_case.patient_id,
            new_case.description,
            new_case.severity,
            new_case.location,
        );
        case.validate()?;
        let case = self.cases.create_case(case).await?;
        info!(case_id = %case.id, severity = %case.severity, "Case submitted");

        let outcome = self.engine.assign(&case).await;
        let case = match &outcome {
            Ok(assignment) => assignment.case.clone(),
            Err(e) => {
                warn!(case_id = %case.id, error = %e, "Case left pending");
                case
            }
        };
        Ok(Submission { case, outcome })
    }

    /// Runs assignment for one stored case.
    pub async fn assign_case(&self, case_id: &str) -> Result<Assignment, AssignmentError> {
        let case = self.get_case(case_id).await?;
        self.engine.assign(&case).await
    }

    /// Re-attempts every pending case, oldest first.
    ///
    /// Stops early only when the store itself fails to list cases.
    pub async fn retry_pending(&self) -> Result<Vec<RetryOutcome>, AssignmentError> {
        let mut pending = self.cases.list_cases(Some(CaseStatus::Pending)).await?;
        pending.reverse();

        let mut outcomes = Vec::with_capacity(pending.len());
        for case in pending {
            let outcome = self.engine.assign(&case).await;
            outcomes.push(RetryOutcome {
                case_id: case.id,
                outcome,
            });
        }

        let assigned = outcomes.iter().filter(|o| o.outcome.is_ok()).count();
        info!(
            attempted = outcomes.len(),
            assigned = assigned,
            "Pending cases re-attempted"
        );
        Ok(outcomes)
    }

    pub async fn get_case(&self, case_id: &str) -> Result<EmergencyCase, AssignmentError> {
        self.cases
            .get_case(case_id)
            .await?
            .ok_or_else(|| AssignmentError::CaseNotFound(case_id.to_string()))
    }

    /// Staff moves a case along `assigned -> in_progress -> completed`.
    ///
    /// `pending -> assigned` belongs to the engine and is rejected here.
    /// Responders are left alone; they report their own status.
    pub async fn advance_case(
        &self,
        case_id: &str,
        expected: CaseStatus,
        new_status: CaseStatus,
    ) -> Result<EmergencyCase, AssignmentError> {
        if new_status == CaseStatus::Assigned {
            return Err(CoreError::InvalidCaseTransition {
                from: expected,
                to: new_status,
            }
            .into());
        }

        let case = self
            .cases
            .update_case_status(case_id, expected, new_status)
            .await
            .map_err(|e| match e {
                StorageError::NotFound { .. } => AssignmentError::CaseNotFound(case_id.to_string()),
                StorageError::StatusConflict { actual, .. } => AssignmentError::Conflict {
                    entity: Entity::Case,
                    id: case_id.to_string(),
                    actual,
                },
                other => other.into(),
            })?;
        info!(case_id = %case.id, status = %case.status, "Case status updated");

        let mut recipients = Vec::new();
        if let Some(hospital_id) = &case.assigned_hospital_id {
            recipients.push(hospital_id.clone());
        }
        if let Some(responder_id) = &case.assigned_responder_id {
            match self.capacity.get_responder(responder_id).await {
                Ok(Some(responder)) => recipients.push(responder.user_id),
                Ok(None) => {}
                Err(e) => warn!(responder_id = %responder_id, error = %e, "Responder lookup failed"),
            }
        }
        let also: Vec<&str> = recipients.iter().map(String::as_str).collect();
        self.engine.notifier().status_update(&case, &also);

        Ok(case)
    }

    /// Staff edits a hospital's free beds, e.g. after a discharge.
    pub async fn adjust_capacity(
        &self,
        hospital_id: &str,
        expected_available: u32,
        new_available: u32,
    ) -> Result<Hospital, AssignmentError> {
        let outcome = self
            .capacity
            .update_hospital_availability(hospital_id, expected_available, new_available)
            .await?;
        if let WriteOutcome::Conflict { actual } = outcome {
            return Err(AssignmentError::Conflict {
                entity: Entity::Hospital,
                id: hospital_id.to_string(),
                actual,
            });
        }

        let hospital = self
            .capacity
            .get_hospital(hospital_id)
            .await?
            .ok_or_else(|| StorageError::not_found(Entity::Hospital, hospital_id))?;
        info!(
            hospital_id = %hospital.id,
            available = hospital.capacity.available,
            "Hospital capacity updated"
        );
        self.engine.notifier().hospital_update(&hospital);
        Ok(hospital)
    }

    /// A responder reports its own status.
    pub async fn update_responder_status(
        &self,
        responder_id: &str,
        expected: ResponderStatus,
        new_status: ResponderStatus,
    ) -> Result<EmergencyResponder, AssignmentError> {
        if !expected.can_report(new_status) {
            return Err(CoreError::InvalidResponderTransition {
                from: expected,
                to: new_status,
            }
            .into());
        }

        let outcome = self
            .capacity
            .update_responder_status(responder_id, expected, new_status)
            .await?;
        if let WriteOutcome::Conflict { actual } = outcome {
            return Err(AssignmentError::Conflict {
                entity: Entity::Responder,
                id: responder_id.to_string(),
                actual,
            });
        }

        let responder = self
            .capacity
            .get_responder(responder_id)
            .await?
            .ok_or_else(|| StorageError::not_found(Entity::Responder, responder_id))?;
        info!(
            responder_id = %responder.id,
            status = %responder.status,
            "Responder status updated"
        );
        self.engine.notifier().responder_update(&responder);
        Ok(responder)
    }
}
