//! In-memory store backend for the emergency response coordinator.
//!
//! This crate implements every trait from `rescue-storage` on top of
//! `dashmap`. Each conditional write runs under the shard lock of the record
//! it touches, so the compare and the set are atomic without any global lock.
//!
//! # Example
//!
//! ```ignore
//! use rescue_db_memory::InMemoryStore;
//! use rescue_storage::CapacityStore;
//!
//! let store = InMemoryStore::new();
//! store.insert_hospital(hospital).await?;
//! let outcome = store.reserve_hospital_bed("h-1", 3).await?;
//! ```

pub mod storage;

pub use rescue_storage::{CapacityStore, CaseStore, StorageError, VerificationCodeStore};
pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> std::sync::Arc<InMemoryStore> {
    std::sync::Arc::new(InMemoryStore::new())
}
