//! # rescue-storage
//!
//! Store adapter contract for the emergency response coordinator.
//!
//! This crate defines the traits and types every store backend must implement.
//! It holds no state and contains no implementation; the in-memory backend
//! lives in `rescue-db-memory`.
//!
//! ## Overview
//!
//! - [`CapacityStore`]: hospital beds, responder status and the case
//!   assignment write used by the assignment engine.
//! - [`CaseStore`]: case submission, listing and staff lifecycle updates.
//! - [`VerificationCodeStore`]: single-use staff registration codes.
//!
//! Every write to shared counters is conditional on the value the caller last
//! observed. A stale expectation is reported as [`WriteOutcome::Conflict`]
//! instead of being overwritten.
//!
//! ## Example
//!
//! ```ignore
//! use rescue_storage::{CapacityStore, WriteOutcome};
//!
//! async fn claim_bed(store: &dyn CapacityStore, hospital_id: &str) -> bool {
//!     let Some(h) = store.get_hospital(hospital_id).await.ok().flatten() else {
//!         return false;
//!     };
//!     matches!(
//!         store.reserve_hospital_bed(&h.id, h.capacity.available).await,
//!         Ok(WriteOutcome::Applied)
//!     )
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{CapacityStore, CaseStore, VerificationCodeStore};
pub use types::{Entity, WriteOutcome};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shareable capacity store trait object.
pub type DynCapacityStore = std::sync::Arc<dyn CapacityStore>;

/// Shareable case store trait object.
pub type DynCaseStore = std::sync::Arc<dyn CaseStore>;

/// Shareable verification code store trait object.
pub type DynVerificationCodeStore = std::sync::Arc<dyn VerificationCodeStore>;
