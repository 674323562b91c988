use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rescue_core::{
    CaseStatus, EmergencyCase, EmergencyResponder, Hospital, ResponderStatus, StaffRole,
    VerificationCode,
};
use rescue_storage::{
    CapacityStore, CaseStore, Entity, StorageError, VerificationCodeStore, WriteOutcome,
};
use time::OffsetDateTime;
use tracing::debug;

pub type CodeKey = String; // Format: "role/code"

pub(crate) fn make_code_key(role: StaffRole, code: &str) -> CodeKey {
    format!("{role}/{code}")
}

/// In-memory store backend.
///
/// All maps are keyed by record id. Conditional updates take the shard write
/// lock of a single record through `get_mut`, compare, and write before the
/// guard drops; no guard is held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub(crate) hospitals: DashMap<String, Hospital>,
    pub(crate) responders: DashMap<String, EmergencyResponder>,
    pub(crate) cases: DashMap<String, EmergencyCase>,
    pub(crate) codes: DashMap<CodeKey, VerificationCode>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hospital_count(&self) -> usize {
        self.hospitals.len()
    }

    pub fn responder_count(&self) -> usize {
        self.responders.len()
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }
}

#[async_trait]
impl CapacityStore for InMemoryStore {
    async fn list_hospitals_with_availability(
        &self,
        min_available: u32,
    ) -> Result<Vec<Hospital>, StorageError> {
        let mut hospitals: Vec<Hospital> = self
            .hospitals
            .iter()
            .filter(|entry| entry.capacity.available >= min_available)
            .map(|entry| entry.value().clone())
            .collect();
        hospitals.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hospitals)
    }

    async fn get_hospital(&self, id: &str) -> Result<Option<Hospital>, StorageError> {
        Ok(self.hospitals.get(id).map(|entry| entry.value().clone()))
    }

    async fn insert_hospital(&self, hospital: Hospital) -> Result<Hospital, StorageError> {
        hospital.validate()?;
        match self.hospitals.entry(hospital.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(Entity::Hospital, hospital.id)),
            Entry::Vacant(slot) => {
                slot.insert(hospital.clone());
                Ok(hospital)
            }
        }
    }

    async fn update_hospital_availability(
        &self,
        id: &str,
        expected_available: u32,
        new_available: u32,
    ) -> Result<WriteOutcome, StorageError> {
        let mut hospital = self
            .hospitals
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(Entity::Hospital, id))?;

        if hospital.capacity.available != expected_available {
            debug!(
                hospital_id = id,
                expected = expected_available,
                actual = hospital.capacity.available,
                "Hospital availability conflict"
            );
            return Ok(WriteOutcome::conflict(hospital.capacity.available));
        }

        hospital.capacity = hospital.capacity.with_available(new_available)?;
        Ok(WriteOutcome::Applied)
    }

    async fn list_responders(
        &self,
        status: ResponderStatus,
    ) -> Result<Vec<EmergencyResponder>, StorageError> {
        let mut responders: Vec<EmergencyResponder> = self
            .responders
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.value().clone())
            .collect();
        responders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(responders)
    }

    async fn get_responder(&self, id: &str) -> Result<Option<EmergencyResponder>, StorageError> {
        Ok(self.responders.get(id).map(|entry| entry.value().clone()))
    }

    async fn insert_responder(
        &self,
        responder: EmergencyResponder,
    ) -> Result<EmergencyResponder, StorageError> {
        responder.validate()?;
        match self.responders.entry(responder.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(
                Entity::Responder,
                responder.id,
            )),
            Entry::Vacant(slot) => {
                slot.insert(responder.clone());
                Ok(responder)
            }
        }
    }

    async fn update_responder_status(
        &self,
        id: &str,
        expected_status: ResponderStatus,
        new_status: ResponderStatus,
    ) -> Result<WriteOutcome, StorageError> {
        let mut responder = self
            .responders
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(Entity::Responder, id))?;

        if responder.status != expected_status {
            debug!(
                responder_id = id,
                expected = %expected_status,
                actual = %responder.status,
                "Responder status conflict"
            );
            return Ok(WriteOutcome::conflict(responder.status));
        }

        responder.status = new_status;
        responder.last_update = OffsetDateTime::now_utc();
        Ok(WriteOutcome::Applied)
    }

    async fn update_case_assignment(
        &self,
        case_id: &str,
        hospital_id: &str,
        responder_id: &str,
    ) -> Result<EmergencyCase, StorageError> {
        let mut case = self
            .cases
            .get_mut(case_id)
            .ok_or_else(|| StorageError::not_found(Entity::Case, case_id))?;

        case.assign(hospital_id, responder_id)
            .map_err(|e| StorageError::invalid_transition(Entity::Case, case_id, e.to_string()))?;
        Ok(case.value().clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn create_case(&self, case: EmergencyCase) -> Result<EmergencyCase, StorageError> {
        case.validate()?;
        match self.cases.entry(case.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(Entity::Case, case.id)),
            Entry::Vacant(slot) => {
                slot.insert(case.clone());
                Ok(case)
            }
        }
    }

    async fn get_case(&self, id: &str) -> Result<Option<EmergencyCase>, StorageError> {
        Ok(self.cases.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
    ) -> Result<Vec<EmergencyCase>, StorageError> {
        let mut cases: Vec<EmergencyCase> = self
            .cases
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(cases)
    }

    async fn update_case_status(
        &self,
        id: &str,
        expected: CaseStatus,
        new_status: CaseStatus,
    ) -> Result<EmergencyCase, StorageError> {
        let mut case = self
            .cases
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(Entity::Case, id))?;

        if case.status != expected {
            return Err(StorageError::status_conflict(
                Entity::Case,
                id,
                expected,
                case.status,
            ));
        }

        case.transition_to(new_status)
            .map_err(|e| StorageError::invalid_transition(Entity::Case, id, e.to_string()))?;
        Ok(case.value().clone())
    }
}

#[async_trait]
impl VerificationCodeStore for InMemoryStore {
    async fn create_code(&self, code: VerificationCode) -> Result<VerificationCode, StorageError> {
        let key = make_code_key(code.role, &code.code);
        match self.codes.entry(key) {
            Entry::Occupied(_) => Err(StorageError::already_exists(
                Entity::VerificationCode,
                code.code,
            )),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(code)
            }
        }
    }

    async fn list_codes(&self) -> Result<Vec<VerificationCode>, StorageError> {
        let mut codes: Vec<VerificationCode> =
            self.codes.iter().map(|entry| entry.value().clone()).collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(codes)
    }

    async fn consume_code(&self, code: &str, role: StaffRole) -> Result<bool, StorageError> {
        // `remove` is atomic: concurrent consumers race and only one gets the entry.
        Ok(self.codes.remove(&make_code_key(role, code)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_core::{Capacity, Location, Severity};

    fn hospital(id: &str, total: u32, available: u32) -> Hospital {
        Hospital::new(
            format!("Hospital {id}"),
            Location::new(0.0, 0.0),
            Capacity::new(total, available).unwrap(),
        )
        .with_id(id)
    }

    fn responder(id: &str, status: ResponderStatus) -> EmergencyResponder {
        EmergencyResponder::new(format!("user-{id}"), format!("AMB-{id}"), Location::new(0.0, 0.0))
            .with_id(id)
            .with_status(status)
    }

    fn case(id: &str) -> EmergencyCase {
        EmergencyCase::new("patient-1", "fall", Severity::Medium, Location::new(0.0, 0.0))
            .with_id(id)
    }

    #[tokio::test]
    async fn test_list_hospitals_filters_and_orders() {
        let store = InMemoryStore::new();
        store.insert_hospital(hospital("b", 5, 2)).await.unwrap();
        store.insert_hospital(hospital("a", 5, 1)).await.unwrap();
        store.insert_hospital(hospital("c", 5, 0)).await.unwrap();

        let listed = store.list_hospitals_with_availability(1).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let listed = store.list_hospitals_with_availability(2).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.list_hospitals_with_availability(0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_bad_capacity() {
        let store = InMemoryStore::new();
        store.insert_hospital(hospital("h", 1, 1)).await.unwrap();
        let err = store.insert_hospital(hospital("h", 1, 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        let mut bad = hospital("x", 1, 1);
        bad.capacity.available = 2;
        let err = store.insert_hospital(bad).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert_eq!(store.hospital_count(), 1);
    }

    #[tokio::test]
    async fn test_reserve_bed_is_conditional() {
        let store = InMemoryStore::new();
        store.insert_hospital(hospital("h", 3, 2)).await.unwrap();

        assert_eq!(
            store.reserve_hospital_bed("h", 2).await.unwrap(),
            WriteOutcome::Applied
        );
        // Stale expectation
        assert_eq!(
            store.reserve_hospital_bed("h", 2).await.unwrap(),
            WriteOutcome::conflict(1)
        );
        assert!(store.reserve_hospital_bed("h", 1).await.unwrap().is_applied());
        // Nothing left, and a zero expectation is never applied
        assert!(store.reserve_hospital_bed("h", 0).await.unwrap().is_conflict());

        let h = store.get_hospital("h").await.unwrap().unwrap();
        assert_eq!(h.capacity.available, 0);
    }

    #[tokio::test]
    async fn test_availability_update_respects_total() {
        let store = InMemoryStore::new();
        store.insert_hospital(hospital("h", 2, 1)).await.unwrap();

        let err = store.update_hospital_availability("h", 1, 3).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert!(store.update_hospital_availability("h", 1, 2).await.unwrap().is_applied());

        let err = store.update_hospital_availability("missing", 0, 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reserve_responder() {
        let store = InMemoryStore::new();
        store
            .insert_responder(responder("r", ResponderStatus::Available))
            .await
            .unwrap();

        assert!(
            store
                .reserve_responder("r", ResponderStatus::Available)
                .await
                .unwrap()
                .is_applied()
        );
        assert_eq!(
            store
                .reserve_responder("r", ResponderStatus::Available)
                .await
                .unwrap(),
            WriteOutcome::conflict("assigned")
        );
        assert!(
            store
                .list_responders(ResponderStatus::Available)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store
                .list_responders(ResponderStatus::Assigned)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_case_assignment_requires_pending() {
        let store = InMemoryStore::new();
        store.create_case(case("c")).await.unwrap();

        let assigned = store.update_case_assignment("c", "h", "r").await.unwrap();
        assert_eq!(assigned.status, CaseStatus::Assigned);
        assert_eq!(assigned.assigned_hospital_id.as_deref(), Some("h"));

        let err = store.update_case_assignment("c", "h2", "r2").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));

        let err = store.update_case_assignment("nope", "h", "r").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_case_status_updates_are_conditional() {
        let store = InMemoryStore::new();
        store.create_case(case("c")).await.unwrap();
        store.update_case_assignment("c", "h", "r").await.unwrap();

        let err = store
            .update_case_status("c", CaseStatus::Pending, CaseStatus::Assigned)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::StatusConflict { .. }));

        let err = store
            .update_case_status("c", CaseStatus::Assigned, CaseStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));

        let updated = store
            .update_case_status("c", CaseStatus::Assigned, CaseStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, CaseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_list_cases_by_status() {
        let store = InMemoryStore::new();
        store.create_case(case("c1")).await.unwrap();
        store.create_case(case("c2")).await.unwrap();
        store.update_case_assignment("c2", "h", "r").await.unwrap();

        let pending = store.list_cases(Some(CaseStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c1");
        assert_eq!(store.list_cases(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_verification_code_is_single_use() {
        let store = InMemoryStore::new();
        let code = VerificationCode::new("ABC-1", StaffRole::Responder).unwrap();
        store.create_code(code.clone()).await.unwrap();
        assert!(store.create_code(code).await.is_err());

        assert!(!store.consume_code("ABC-1", StaffRole::Hospital).await.unwrap());
        assert!(store.consume_code("ABC-1", StaffRole::Responder).await.unwrap());
        assert!(!store.consume_code("ABC-1", StaffRole::Responder).await.unwrap());
        assert!(store.list_codes().await.unwrap().is_empty());
    }

    #[test]
    fn test_make_code_key() {
        assert_eq!(make_code_key(StaffRole::Hospital, "X1"), "hospital/X1");
    }
}
