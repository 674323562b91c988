use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::geo::Location;
use crate::id::generate_id;

/// Availability of an emergency responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponderStatus {
    Available,
    Assigned,
    Busy,
}

impl ResponderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStatus::Available => "available",
            ResponderStatus::Assigned => "assigned",
            ResponderStatus::Busy => "busy",
        }
    }

    /// Transitions a responder may report for itself.
    ///
    /// `available -> assigned` is missing on purpose: only a reservation
    /// made by the assignment engine takes that edge.
    pub fn can_report(&self, next: ResponderStatus) -> bool {
        matches!(
            (self, next),
            (ResponderStatus::Assigned, ResponderStatus::Busy)
                | (ResponderStatus::Assigned, ResponderStatus::Available)
                | (ResponderStatus::Busy, ResponderStatus::Available)
        )
    }
}

impl std::fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResponderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(ResponderStatus::Available),
            "assigned" => Ok(ResponderStatus::Assigned),
            "busy" => Ok(ResponderStatus::Busy),
            other => Err(CoreError::invalid_field(
                "status",
                format!("unknown responder status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyResponder {
    pub id: String,
    /// Account of the person operating the vehicle.
    pub user_id: String,
    pub vehicle_id: String,
    pub status: ResponderStatus,
    pub location: Location,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

impl EmergencyResponder {
    pub fn new(user_id: impl Into<String>, vehicle_id: impl Into<String>, location: Location) -> Self {
        Self {
            id: generate_id(),
            user_id: user_id.into(),
            vehicle_id: vehicle_id.into(),
            status: ResponderStatus::Available,
            location,
            last_update: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: ResponderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == ResponderStatus::Available
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(CoreError::invalid_field("userId", "must not be empty"));
        }
        if self.vehicle_id.trim().is_empty() {
            return Err(CoreError::invalid_field("vehicleId", "must not be empty"));
        }
        self.location.coordinate().validate()
    }
}
