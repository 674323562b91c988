use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geo::Location;
use crate::id::generate_id;

/// Bed capacity of a hospital. `available` never exceeds `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub total: u32,
    pub available: u32,
}

impl Capacity {
    pub fn new(total: u32, available: u32) -> Result<Self> {
        let capacity = Self { total, available };
        capacity.validate()?;
        Ok(capacity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.available > self.total {
            return Err(CoreError::invalid_capacity(self.total, self.available));
        }
        Ok(())
    }

    pub fn has_free_bed(&self) -> bool {
        self.available > 0
    }

    /// Capacity with `available` replaced, validated against `total`.
    pub fn with_available(&self, available: u32) -> Result<Self> {
        Self::new(self.total, available)
    }
}

/// Specialised equipment counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalResources {
    pub icu_beds: u32,
    pub ventilators: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub capacity: Capacity,
    #[serde(default)]
    pub resources: HospitalResources,
    #[serde(default)]
    pub specialties: Vec<String>,
}

impl Hospital {
    pub fn new(name: impl Into<String>, location: Location, capacity: Capacity) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            location,
            capacity,
            resources: HospitalResources::default(),
            specialties: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_resources(mut self, resources: HospitalResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_specialties<I, S>(mut self, specialties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specialties = specialties.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid_field("name", "must not be empty"));
        }
        self.capacity.validate()?;
        self.location.coordinate().validate()
    }
}
