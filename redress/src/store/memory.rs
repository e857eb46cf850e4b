//! In-memory grievance store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GrievanceStore, SaveOutcome, StoreResult};
use crate::grievance::{Grievance, GrievanceId};

/// Process-local store backed by a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<GrievanceId, Grievance>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl GrievanceStore for MemoryStore {
    async fn load(&self, id: &str) -> StoreResult<Option<Grievance>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, grievance: &Grievance) -> StoreResult<SaveOutcome> {
        let mut records = self.records.write().await;
        if let Some(stored) = records.get(&grievance.id) {
            if stored.version > grievance.version {
                return Ok(SaveOutcome::Stale {
                    stored_version: stored.version,
                });
            }
        }
        records.insert(grievance.id.clone(), grievance.clone());
        Ok(SaveOutcome::Written)
    }

    async fn list_open(&self) -> StoreResult<Vec<Grievance>> {
        let records = self.records.read().await;
        let mut open: Vec<Grievance> = records
            .values()
            .filter(|g| !g.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn list_all(&self) -> StoreResult<Vec<Grievance>> {
        let records = self.records.read().await;
        let mut all: Vec<Grievance> = records.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
