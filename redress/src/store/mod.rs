//! Persistence collaborator for grievance records
//!
//! The engine treats persistence as a post-commit side effect: the service
//! saves a record after its transition committed in memory. Stores reject
//! writes older than what they already hold, so saves that race each other
//! cannot regress a record.
//!
//! - [`MemoryStore`]: process-local map, the default
//! - `RocksStore`: RocksDB column families (`heavy-state` feature)

pub mod memory;
#[cfg(feature = "heavy-state")]
pub mod rocks;
#[cfg(feature = "heavy-state")]
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;

use crate::grievance::Grievance;

pub use memory::MemoryStore;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "heavy-state")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether a save was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// The store already holds a strictly newer version; nothing written.
    /// Saving the stored version again is accepted as a retry.
    Stale { stored_version: u64 },
}

/// Persistence collaborator
#[async_trait]
pub trait GrievanceStore: Send + Sync {
    /// Load one grievance by id
    async fn load(&self, id: &str) -> StoreResult<Option<Grievance>>;

    /// Save the full record, including its appended history
    async fn save(&self, grievance: &Grievance) -> StoreResult<SaveOutcome>;

    /// All grievances not in a terminal status
    async fn list_open(&self) -> StoreResult<Vec<Grievance>>;

    /// Every stored grievance
    async fn list_all(&self) -> StoreResult<Vec<Grievance>>;
}

/// Shared reference to a store
pub type SharedStore = Arc<dyn GrievanceStore>;
