//! RocksDB-backed grievance store
//!
//! Current records live in `grievances`; each history event is also written
//! under its own key in `history` so the audit trail can be scanned without
//! decoding full records. Values are JSON.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use super::schema::{self, keys, ALL_CFS};
use super::{GrievanceStore, SaveOutcome, StoreError, StoreResult};
use crate::grievance::{Grievance, GrievanceEvent};

/// Persistent store with column families for records and history
pub struct RocksStore {
    db: DB,
    path: PathBuf,
    // Serializes read-compare-write in `save`
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut values = Vec::new();
        let iter = self.db.iterator_cf(
            cf,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let decoded = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            values.push(decoded);
        }
        Ok(values)
    }

    /// Audit trail of one grievance, read from the history column family
    pub fn history(&self, grievance_id: &str) -> StoreResult<Vec<GrievanceEvent>> {
        self.scan(schema::CF_HISTORY, &keys::history_prefix(grievance_id))
    }
}

#[async_trait]
impl GrievanceStore for RocksStore {
    async fn load(&self, id: &str) -> StoreResult<Option<Grievance>> {
        self.get(schema::CF_GRIEVANCES, &keys::grievance(id))
    }

    async fn save(&self, grievance: &Grievance) -> StoreResult<SaveOutcome> {
        let _guard = self.write_lock.lock().await;

        let stored: Option<Grievance> =
            self.get(schema::CF_GRIEVANCES, &keys::grievance(&grievance.id))?;
        let already = match &stored {
            Some(stored) if stored.version > grievance.version => {
                return Ok(SaveOutcome::Stale {
                    stored_version: stored.version,
                });
            }
            Some(stored) => stored.history.len(),
            None => 0,
        };

        // History is append-only; only events beyond the stored record are new
        for (index, event) in grievance.history.iter().enumerate().skip(already) {
            self.put(schema::CF_HISTORY, &keys::history(&grievance.id, index), event)?;
        }
        self.put(
            schema::CF_GRIEVANCES,
            &keys::grievance(&grievance.id),
            grievance,
        )?;
        Ok(SaveOutcome::Written)
    }

    async fn list_open(&self) -> StoreResult<Vec<Grievance>> {
        let all = self.list_all().await?;
        Ok(all.into_iter().filter(|g| !g.is_terminal()).collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<Grievance>> {
        let mut all: Vec<Grievance> = self.scan(schema::CF_GRIEVANCES, "grv:")?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grievance::{EventType, GrievanceStatus, Privacy};
    use crate::lifecycle::access::ActorRole;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(version: u64, events: usize) -> Grievance {
        let now = Utc::now();
        let history = (0..events)
            .map(|_| GrievanceEvent {
                event_type: EventType::Submit,
                at: now,
                by_role: ActorRole::Citizen,
                by_id: Some("c-1".to_string()),
                note: None,
                to_authority_id: None,
                attachments: vec![],
                from_status: None,
                to_status: GrievanceStatus::Submitted,
            })
            .collect();
        Grievance {
            id: "g-1".to_string(),
            citizen_id: "c-1".to_string(),
            category: "Utilities".to_string(),
            department_id: "DPT-UTIL".to_string(),
            authority_id: "L0".to_string(),
            escalation_level: 0,
            assignee_id: None,
            subject: "s".to_string(),
            description: "d".to_string(),
            desired_outcome: None,
            attachments: vec![],
            privacy: Privacy::default(),
            created_at: now,
            updated_at: now,
            status_since: now,
            sla_days: 7,
            status: GrievanceStatus::Submitted,
            history,
            version,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_history() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        store.save(&record(0, 1)).await.unwrap();
        store.save(&record(1, 2)).await.unwrap();

        let loaded = store.load("g-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(store.history("g-1").unwrap().len(), 2);
        assert_eq!(store.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_stale_version() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        store.save(&record(4, 3)).await.unwrap();
        let outcome = store.save(&record(2, 2)).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Stale { stored_version: 4 });
    }
}
