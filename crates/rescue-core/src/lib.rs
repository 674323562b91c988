pub mod case;
pub mod error;
pub mod geo;
pub mod hospital;
pub mod id;
pub mod responder;
pub mod verification;

pub use case::{CaseStatus, EmergencyCase, Severity};
pub use error::{CoreError, Result};
pub use geo::{Coordinate, EARTH_RADIUS_KM, Location, distance_km};
pub use hospital::{Capacity, Hospital, HospitalResources};
pub use id::{IdError, generate_id, validate_id};
pub use responder::{EmergencyResponder, ResponderStatus};
pub use verification::{StaffRole, VerificationCode};
