use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::id::generate_id;

/// Roles that need a verification code to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Hospital,
    Responder,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Hospital => "hospital",
            StaffRole::Responder => "responder",
        }
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One-time code authorizing a single staff registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCode {
    pub id: String,
    pub code: String,
    pub role: StaffRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl VerificationCode {
    pub fn new(code: impl Into<String>, role: StaffRole) -> Result<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(CoreError::invalid_field("code", "must not be empty"));
        }
        Ok(Self {
            id: generate_id(),
            code,
            role,
            created_at: OffsetDateTime::now_utc(),
            created_by: None,
        })
    }

    pub fn created_by(mut self, admin_id: impl Into<String>) -> Self {
        self.created_by = Some(admin_id.into());
        self
    }

    pub fn matches(&self, code: &str, role: StaffRole) -> bool {
        self.role == role && self.code == code
    }
}
