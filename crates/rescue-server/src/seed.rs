//! Startup fixtures: hospitals, responders and verification codes.

use std::path::Path;

use rescue_core::{
    Capacity, CoreError, EmergencyResponder, Hospital, HospitalResources, Location,
    ResponderStatus, StaffRole, VerificationCode,
};
use rescue_storage::{CapacityStore, StorageError, VerificationCodeStore};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] CoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SeedData {
    #[serde(default)]
    pub hospitals: Vec<SeedHospital>,
    #[serde(default)]
    pub responders: Vec<SeedResponder>,
    #[serde(default)]
    pub verification_codes: Vec<SeedCode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedHospital {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub location: Location,
    pub capacity: Capacity,
    #[serde(default)]
    pub resources: HospitalResources,
    #[serde(default)]
    pub specialties: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResponder {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub vehicle_id: String,
    pub location: Location,
    #[serde(default)]
    pub status: Option<ResponderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCode {
    pub code: String,
    pub role: StaffRole,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Counts of records written by [`apply`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub hospitals: usize,
    pub responders: usize,
    pub verification_codes: usize,
}

pub fn load(path: impl AsRef<Path>) -> Result<SeedData, SeedError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub async fn apply(
    data: SeedData,
    capacity: &dyn CapacityStore,
    codes: &dyn VerificationCodeStore,
) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();

    for h in data.hospitals {
        let mut hospital = Hospital::new(h.name, h.location, h.capacity)
            .with_resources(h.resources)
            .with_specialties(h.specialties);
        if let Some(id) = h.id {
            hospital = hospital.with_id(id);
        }
        hospital.validate()?;
        capacity.insert_hospital(hospital).await?;
        summary.hospitals += 1;
    }

    for r in data.responders {
        let mut responder = EmergencyResponder::new(r.user_id, r.vehicle_id, r.location);
        if let Some(id) = r.id {
            responder = responder.with_id(id);
        }
        if let Some(status) = r.status {
            responder = responder.with_status(status);
        }
        responder.validate()?;
        capacity.insert_responder(responder).await?;
        summary.responders += 1;
    }

    for c in data.verification_codes {
        let mut code = VerificationCode::new(c.code, c.role)?;
        if let Some(admin) = c.created_by {
            code = code.created_by(admin);
        }
        codes.create_code(code).await?;
        summary.verification_codes += 1;
    }

    info!(
        hospitals = summary.hospitals,
        responders = summary.responders,
        verification_codes = summary.verification_codes,
        "Seed data applied"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_db_memory::InMemoryStore;

    const SEED: &str = r#"{
        "hospitals": [
            {"id": "h-1", "name": "General", "location": {"latitude": 6.5, "longitude": 3.4},
             "capacity": {"total": 10, "available": 4}, "specialties": ["trauma"]}
        ],
        "responders": [
            {"userId": "medic-1", "vehicleId": "AMB-1", "location": {"latitude": 6.4, "longitude": 3.3}},
            {"id": "r-2", "userId": "medic-2", "vehicleId": "AMB-2",
             "location": {"latitude": 6.4, "longitude": 3.3}, "status": "busy"}
        ],
        "verification_codes": [
            {"code": "HOSP-001", "role": "hospital", "createdBy": "admin"}
        ]
    }"#;

    #[tokio::test]
    async fn test_apply_writes_everything() {
        let store = InMemoryStore::new();
        let data: SeedData = serde_json::from_str(SEED).unwrap();
        let summary = apply(data, &store, &store).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                hospitals: 1,
                responders: 2,
                verification_codes: 1
            }
        );
        let hospital = store.get_hospital("h-1").await.unwrap().unwrap();
        assert_eq!(hospital.capacity.available, 4);
        let busy = store.get_responder("r-2").await.unwrap().unwrap();
        assert_eq!(busy.status, ResponderStatus::Busy);
        assert!(store.consume_code("HOSP-001", StaffRole::Hospital).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_rejects_bad_capacity() {
        let store = InMemoryStore::new();
        let data: SeedData = serde_json::from_str(
            r#"{"hospitals": [{"name": "X", "location": {"latitude": 0, "longitude": 0},
                "capacity": {"total": 1, "available": 3}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            apply(data, &store, &store).await,
            Err(SeedError::Invalid(_))
        ));
    }
}
