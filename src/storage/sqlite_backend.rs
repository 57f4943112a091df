//! SQLite implementation of the MemoryStore trait
//!
//! Wraps [`Storage`] and delegates to the functions in `queries.rs`. Batch
//! writes run inside a single transaction.

use chrono::{DateTime, Utc};

use super::backend::MemoryStore;
use super::connection::Storage;
use super::queries;
use crate::error::{Result, RetentionError};
use crate::types::{
    ImportanceUpdate, MemoryId, MemoryRecord, NewMemory, OwnerId, StorageConfig, StorageMode,
};

/// SQLite-based memory store
#[derive(Clone)]
pub struct SqliteBackend {
    storage: Storage,
}

impl SqliteBackend {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let storage = Storage::open(config)?;
        Ok(Self { storage })
    }

    /// In-memory backend (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let storage = Storage::open_in_memory()?;
        Ok(Self { storage })
    }
}

impl MemoryStore for SqliteBackend {
    fn insert_memory(&self, input: &NewMemory) -> Result<MemoryRecord> {
        self.storage
            .with_transaction(|conn| queries::insert_memory(conn, input))
    }

    fn apply_decay_batch(&self, owner_id: &str, updates: &[ImportanceUpdate]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        self.storage
            .with_transaction(|conn| queries::apply_decay_batch(conn, owner_id, updates))
    }

    fn delete_records(&self, owner_id: &str, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.storage
            .with_transaction(|conn| queries::delete_records(conn, owner_id, ids))
    }

    fn record_access(&self, id: MemoryId, at: DateTime<Utc>) -> Result<()> {
        self.storage
            .with_connection(|conn| queries::record_access(conn, id, &at))
    }

    fn get_memory(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        self.storage
            .with_connection(|conn| match queries::get_memory(conn, id) {
                Ok(record) => Ok(Some(record)),
                Err(RetentionError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            })
    }

    fn get_owner_memories(&self, owner_id: &str) -> Result<Vec<MemoryRecord>> {
        self.storage
            .with_connection(|conn| queries::owner_memories(conn, owner_id))
    }

    fn get_decay_candidates(
        &self,
        owner_id: &str,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<MemoryRecord>> {
        self.storage
            .with_connection(|conn| queries::decay_candidates(conn, owner_id, &due_before))
    }

    fn list_owners(&self) -> Result<Vec<OwnerId>> {
        self.storage.with_connection(queries::list_owners)
    }

    fn count(&self, owner_id: &str) -> Result<usize> {
        self.storage
            .with_connection(|conn| queries::count_owner(conn, owner_id))
    }

    fn backend_name(&self) -> &'static str {
        match self.storage.storage_mode() {
            StorageMode::Local => "sqlite-wal",
            StorageMode::CloudSafe => "sqlite-delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentDigest, MemoryKind, Visibility};

    fn new_memory(owner: &str, importance: f32) -> NewMemory {
        NewMemory {
            owner_id: owner.to_string(),
            content_digest: ContentDigest::default(),
            memory_kind: MemoryKind::Conversation,
            importance,
            visibility: Visibility::Private,
            topic_drift_count: 0,
            created_at: None,
        }
    }

    #[test]
    fn test_decay_batch_is_atomic() {
        let store = SqliteBackend::in_memory().unwrap();
        let a = store.insert_memory(&new_memory("aria", 0.8)).unwrap();
        let b = store.insert_memory(&new_memory("aria", 0.8)).unwrap();
        let now = Utc::now();

        // Second update is invalid; the first must not land either
        let result = store.apply_decay_batch(
            "aria",
            &[
                ImportanceUpdate {
                    id: a.id,
                    importance: 0.5,
                    last_decay_at: now,
                },
                ImportanceUpdate {
                    id: b.id,
                    importance: f32::NAN,
                    last_decay_at: now,
                },
            ],
        );
        assert!(result.is_err());
        let a = store.get_memory(a.id).unwrap().unwrap();
        assert_eq!(a.importance, 0.8);
    }

    #[test]
    fn test_single_update_writes_score_and_decay_time() {
        let store = SqliteBackend::in_memory().unwrap();
        let record = store.insert_memory(&new_memory("aria", 0.8)).unwrap();
        let decayed_at = Utc::now() + chrono::Duration::minutes(5);

        let written = store
            .apply_decay_batch(
                "aria",
                &[ImportanceUpdate {
                    id: record.id,
                    importance: 0.35,
                    last_decay_at: decayed_at,
                }],
            )
            .unwrap();
        assert_eq!(written, 1);

        let stored = store.get_memory(record.id).unwrap().unwrap();
        assert_eq!(stored.importance, 0.35);
        assert_eq!(
            stored.last_decay_at.timestamp_micros(),
            decayed_at.timestamp_micros()
        );
    }

    #[test]
    fn test_delete_is_atomic() {
        let store = SqliteBackend::in_memory().unwrap();
        let a = store.insert_memory(&new_memory("aria", 0.2)).unwrap();
        let foreign = store.insert_memory(&new_memory("bram", 0.2)).unwrap();

        assert!(store.delete_records("aria", &[a.id, foreign.id]).is_err());
        assert_eq!(store.count("aria").unwrap(), 1);
        assert_eq!(store.count("bram").unwrap(), 1);
    }

    #[test]
    fn test_decay_batch_skips_other_owners() {
        let store = SqliteBackend::in_memory().unwrap();
        let foreign = store.insert_memory(&new_memory("bram", 0.8)).unwrap();
        let written = store
            .apply_decay_batch(
                "aria",
                &[ImportanceUpdate {
                    id: foreign.id,
                    importance: 0.2,
                    last_decay_at: Utc::now(),
                }],
            )
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.get_memory(foreign.id).unwrap().unwrap().importance, 0.8);
    }

    #[test]
    fn test_backend_name() {
        let store = SqliteBackend::in_memory().unwrap();
        assert_eq!(store.backend_name(), "sqlite-wal");
        assert!(store.get_memory(42).unwrap().is_none());
    }
}
