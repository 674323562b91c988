//! Case assignment for the emergency response coordinator.
//!
//! [`AssignmentEngine`] picks the nearest hospital with a free bed and the
//! nearest available responder for a pending case, claims both through
//! conditional store writes and links them to the case. Any reservation made
//! by an attempt that ends in failure is rolled back before the error is
//! returned.
//!
//! [`CaseLifecycle`] wraps the engine with the operations staff and patients
//! drive: submitting cases, re-attempting the pending queue, advancing case
//! status and editing capacity.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod selection;

pub use engine::{Assignment, AssignmentConfig, AssignmentEngine};
pub use error::AssignmentError;
pub use lifecycle::{CaseLifecycle, NewCase, RetryOutcome, Submission};
pub use notify::Notifier;
pub use selection::{Candidate, Selection, nearest};
