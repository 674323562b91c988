//! Emergency case records and their lifecycle.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::geo::Location;
use crate::id::generate_id;

/// Reported severity of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Assigned => "assigned",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Completed => "completed",
        }
    }

    /// Lifecycle edges. `pending -> assigned` is taken only by the
    /// assignment engine, the rest by hospital staff.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (CaseStatus::Pending, CaseStatus::Assigned)
                | (CaseStatus::Assigned, CaseStatus::InProgress)
                | (CaseStatus::InProgress, CaseStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Completed)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CaseStatus::Pending),
            "assigned" => Ok(CaseStatus::Assigned),
            "in_progress" => Ok(CaseStatus::InProgress),
            "completed" => Ok(CaseStatus::Completed),
            other => Err(CoreError::invalid_field(
                "status",
                format!("unknown case status '{other}'"),
            )),
        }
    }
}

/// A single reported emergency incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCase {
    pub id: String,
    pub patient_id: String,
    pub description: String,
    pub severity: Severity,
    pub location: Location,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_hospital_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_responder_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EmergencyCase {
    /// Create a new pending case.
    pub fn new(
        patient_id: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        location: Location,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: generate_id(),
            patient_id: patient_id.into(),
            description: description.into(),
            severity,
            location,
            status: CaseStatus::Pending,
            assigned_hospital_id: None,
            assigned_responder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == CaseStatus::Pending
    }

    /// Validate the fields a reporter controls.
    pub fn validate(&self) -> Result<()> {
        if self.patient_id.trim().is_empty() {
            return Err(CoreError::invalid_field("patientId", "must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(CoreError::invalid_field("description", "must not be empty"));
        }
        self.location.coordinate().validate()
    }

    /// Move the case to `next`, rejecting edges outside the lifecycle.
    pub fn transition_to(&mut self, next: CaseStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidCaseTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Record the engine's assignment. Only valid while pending.
    pub fn assign(&mut self, hospital_id: &str, responder_id: &str) -> Result<()> {
        self.transition_to(CaseStatus::Assigned)?;
        self.assigned_hospital_id = Some(hospital_id.to_string());
        self.assigned_responder_id = Some(responder_id.to_string());
        Ok(())
    }
}
