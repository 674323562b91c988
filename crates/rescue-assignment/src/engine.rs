//! The assignment algorithm.
//!
//! An attempt runs in three steps: reserve a hospital bed, reserve a
//! responder, then link both to the case. Each reservation is a single
//! conditional write; a conflict drops that candidate and the next nearest
//! one is tried against freshly read state. Because every round excludes one
//! more id, the loops end once the candidate set is used up.
//!
//! Reservations made by an attempt that fails later are released before the
//! error is returned. No lock is held between steps, so other attempts may
//! interleave freely.

use std::collections::HashSet;
use std::sync::Arc;

use rescue_core::{Coordinate, EmergencyCase, EmergencyResponder, Hospital, ResponderStatus};
use rescue_notifications::NotificationDispatcher;
use rescue_storage::{CapacityStore, Entity, StorageError, WriteOutcome};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AssignmentError;
use crate::notify::Notifier;
use crate::selection::{Selection, nearest};

/// Default distance (km) under which two candidates count as equally near.
pub const DEFAULT_TIE_TOLERANCE_KM: f64 = 1e-6;

/// Default number of tries when releasing a hospital bed.
pub const DEFAULT_COMPENSATION_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentConfig {
    pub tie_tolerance_km: f64,
    pub compensation_attempts: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            tie_tolerance_km: DEFAULT_TIE_TOLERANCE_KM,
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
        }
    }
}

/// A completed assignment, as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub case: EmergencyCase,
    /// The hospital after its bed was reserved.
    pub hospital: Hospital,
    /// The responder after it was marked `assigned`.
    pub responder: EmergencyResponder,
    pub hospital_distance_km: f64,
    pub responder_distance_km: f64,
}

struct Reserved<T> {
    record: T,
    distance_km: f64,
}

pub struct AssignmentEngine {
    store: Arc<dyn CapacityStore>,
    notifier: Notifier,
    config: AssignmentConfig,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn CapacityStore>,
        dispatcher: Option<Arc<NotificationDispatcher>>,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            store,
            notifier: Notifier::new(dispatcher),
            config,
        }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Assigns the nearest free hospital and the nearest available responder
    /// to a pending case.
    ///
    /// # Errors
    ///
    /// - `NoHospitalAvailable` / `NoResponderAvailable` when no candidate is
    ///   left; any bed already reserved is released first.
    /// - `AssignmentPersistFailed` when the final case write fails; both
    ///   reservations are released first.
    /// - `TransientStoreError` when the store is unreachable.
    /// - `CompensationFailed` when a release could not be applied.
    #[instrument(skip_all, fields(case_id = %case.id))]
    pub async fn assign(&self, case: &EmergencyCase) -> Result<Assignment, AssignmentError> {
        if !case.is_pending() {
            return Err(AssignmentError::CaseNotPending {
                id: case.id.clone(),
                status: case.status,
            });
        }
        let origin = case.location.coordinate();

        let hospitals = self.store.list_hospitals_with_availability(1).await?;
        if hospitals.is_empty() {
            info!("No hospital has a free bed");
            return Err(AssignmentError::NoHospitalAvailable);
        }
        let responders = self.store.list_responders(ResponderStatus::Available).await?;
        if responders.is_empty() {
            info!("No responder is available");
            return Err(AssignmentError::NoResponderAvailable);
        }

        let hospital = self
            .reserve_hospital(origin, hospitals)
            .await?
            .ok_or(AssignmentError::NoHospitalAvailable)?;

        let responder = match self.reserve_responder(origin, responders).await {
            Ok(Some(responder)) => responder,
            Ok(None) => {
                self.release_hospital(&hospital.record.id).await?;
                return Err(AssignmentError::NoResponderAvailable);
            }
            Err(e) => {
                self.release_hospital(&hospital.record.id).await?;
                return Err(e);
            }
        };

        let stored = match self
            .store
            .update_case_assignment(&case.id, &hospital.record.id, &responder.record.id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Assignment write failed, releasing reservations");
                let hospital_released = self.release_hospital(&hospital.record.id).await;
                let responder_released = self.release_responder(&responder.record.id).await;
                hospital_released?;
                responder_released?;
                return Err(AssignmentError::persist_failed(e));
            }
        };

        let assignment = Assignment {
            case: stored,
            hospital: hospital.record,
            responder: responder.record,
            hospital_distance_km: hospital.distance_km,
            responder_distance_km: responder.distance_km,
        };
        info!(
            hospital_id = %assignment.hospital.id,
            responder_id = %assignment.responder.id,
            hospital_distance_km = assignment.hospital_distance_km,
            responder_distance_km = assignment.responder_distance_km,
            "Case assigned"
        );
        self.notifier.case_assigned(&assignment);
        Ok(assignment)
    }

    // ==================== Reservation loops ====================

    async fn reserve_hospital(
        &self,
        origin: Coordinate,
        mut candidates: Vec<Hospital>,
    ) -> Result<Option<Reserved<Hospital>>, AssignmentError> {
        let mut excluded = HashSet::new();
        loop {
            match self.try_hospital(origin, &candidates, &excluded).await? {
                Selection::Selected(reserved) => return Ok(Some(reserved)),
                Selection::Conflict { id, actual } => {
                    debug!(hospital_id = %id, actual = %actual, "Hospital reservation conflict");
                    excluded.insert(id);
                    candidates = self.store.list_hospitals_with_availability(1).await?;
                }
                Selection::Exhausted => return Ok(None),
            }
        }
    }

    async fn try_hospital(
        &self,
        origin: Coordinate,
        candidates: &[Hospital],
        excluded: &HashSet<String>,
    ) -> Result<Selection<Reserved<Hospital>>, AssignmentError> {
        let Some((hospital, distance_km)) =
            nearest(origin, candidates, excluded, self.config.tie_tolerance_km)
        else {
            return Ok(Selection::Exhausted);
        };

        let expected = hospital.capacity.available;
        let outcome = self.store.reserve_hospital_bed(&hospital.id, expected).await;
        match Self::classify(&hospital.id, outcome)? {
            Selection::Selected(()) => {
                let mut record = hospital.clone();
                record.capacity.available = expected.saturating_sub(1);
                Ok(Selection::Selected(Reserved {
                    record,
                    distance_km,
                }))
            }
            Selection::Conflict { id, actual } => Ok(Selection::Conflict { id, actual }),
            Selection::Exhausted => Ok(Selection::Exhausted),
        }
    }

    async fn reserve_responder(
        &self,
        origin: Coordinate,
        mut candidates: Vec<EmergencyResponder>,
    ) -> Result<Option<Reserved<EmergencyResponder>>, AssignmentError> {
        let mut excluded = HashSet::new();
        loop {
            match self.try_responder(origin, &candidates, &excluded).await? {
                Selection::Selected(reserved) => return Ok(Some(reserved)),
                Selection::Conflict { id, actual } => {
                    debug!(responder_id = %id, actual = %actual, "Responder reservation conflict");
                    excluded.insert(id);
                    candidates = self
                        .store
                        .list_responders(ResponderStatus::Available)
                        .await?;
                }
                Selection::Exhausted => return Ok(None),
            }
        }
    }

    async fn try_responder(
        &self,
        origin: Coordinate,
        candidates: &[EmergencyResponder],
        excluded: &HashSet<String>,
    ) -> Result<Selection<Reserved<EmergencyResponder>>, AssignmentError> {
        let Some((responder, distance_km)) =
            nearest(origin, candidates, excluded, self.config.tie_tolerance_km)
        else {
            return Ok(Selection::Exhausted);
        };

        let outcome = self
            .store
            .reserve_responder(&responder.id, ResponderStatus::Available)
            .await;
        match Self::classify(&responder.id, outcome)? {
            Selection::Selected(()) => Ok(Selection::Selected(Reserved {
                record: responder.clone().with_status(ResponderStatus::Assigned),
                distance_km,
            })),
            Selection::Conflict { id, actual } => Ok(Selection::Conflict { id, actual }),
            Selection::Exhausted => Ok(Selection::Exhausted),
        }
    }

    /// Maps a reservation write onto the selection outcome. Errors other
    /// than transient I/O mean the candidate changed under us (deleted,
    /// edited past its total), so they count as a conflict for it.
    fn classify(
        id: &str,
        outcome: Result<WriteOutcome, StorageError>,
    ) -> Result<Selection<()>, AssignmentError> {
        match outcome {
            Ok(WriteOutcome::Applied) => Ok(Selection::Selected(())),
            Ok(WriteOutcome::Conflict { actual }) => Ok(Selection::Conflict {
                id: id.to_string(),
                actual,
            }),
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                warn!(candidate_id = id, error = %e, category = %e.category(), "Reservation rejected");
                Ok(Selection::Conflict {
                    id: id.to_string(),
                    actual: e.to_string(),
                })
            }
        }
    }

    // ==================== Compensation ====================

    /// Gives one bed back. The increment is conditional on a fresh read and
    /// retried a bounded number of times.
    async fn release_hospital(&self, id: &str) -> Result<(), AssignmentError> {
        let attempts = self.config.compensation_attempts.max(1);
        for attempt in 1..=attempts {
            let current = match self.store.get_hospital(id).await {
                Ok(Some(hospital)) => hospital.capacity,
                Ok(None) => break,
                Err(e) if e.is_transient() => {
                    debug!(hospital_id = id, attempt = attempt, error = %e, "Release read failed");
                    continue;
                }
                Err(e) => {
                    error!(hospital_id = id, error = %e, "Release read failed");
                    break;
                }
            };
            if current.available >= current.total {
                error!(
                    hospital_id = id,
                    available = current.available,
                    total = current.total,
                    "Cannot release bed: hospital already at full capacity"
                );
                break;
            }

            match self
                .store
                .update_hospital_availability(id, current.available, current.available + 1)
                .await
            {
                Ok(WriteOutcome::Applied) => {
                    debug!(hospital_id = id, "Hospital bed released");
                    return Ok(());
                }
                Ok(WriteOutcome::Conflict { actual }) => {
                    debug!(hospital_id = id, attempt = attempt, actual = %actual, "Release conflict");
                }
                Err(e) if e.is_transient() => {
                    debug!(hospital_id = id, attempt = attempt, error = %e, "Release write failed");
                }
                Err(e) => {
                    error!(hospital_id = id, error = %e, "Release write failed");
                    break;
                }
            }
        }

        error!(hospital_id = id, "Hospital bed left reserved after failed assignment");
        Err(AssignmentError::compensation_failed(Entity::Hospital, id))
    }

    /// Puts an `assigned` responder back to `available`.
    async fn release_responder(&self, id: &str) -> Result<(), AssignmentError> {
        let attempts = self.config.compensation_attempts.max(1);
        for attempt in 1..=attempts {
            match self
                .store
                .update_responder_status(id, ResponderStatus::Assigned, ResponderStatus::Available)
                .await
            {
                Ok(WriteOutcome::Applied) => {
                    debug!(responder_id = id, "Responder released");
                    return Ok(());
                }
                Ok(WriteOutcome::Conflict { actual }) => {
                    error!(responder_id = id, actual = %actual, "Responder changed before release");
                    break;
                }
                Err(e) if e.is_transient() => {
                    debug!(responder_id = id, attempt = attempt, error = %e, "Release write failed");
                }
                Err(e) => {
                    error!(responder_id = id, error = %e, "Release write failed");
                    break;
                }
            }
        }

        error!(responder_id = id, "Responder left assigned after failed assignment");
        Err(AssignmentError::compensation_failed(Entity::Responder, id))
    }
}
