//! Storage backend trait for the retention engine
//!
//! The engine reads and mutates memory records only through
//! [`MemoryStore`], so any persistence layer that can honor per-owner atomic
//! batches can host it.
//!
//! # Design Principles
//!
//! 1. **Sync Interface**: All methods are synchronous. The decay scheduler
//!    wraps them with `tokio::task::spawn_blocking`.
//!
//! 2. **Per-owner atomicity**: `apply_decay_batch` and `delete_records`
//!    either apply fully or not at all.
//!
//! 3. **Immutable Self**: Methods take `&self` so a store can be shared
//!    behind an `Arc` between the scheduler and foreground callers.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{ImportanceUpdate, MemoryId, MemoryRecord, NewMemory, OwnerId};

/// Persistence seam for memory records
pub trait MemoryStore: Send + Sync {
    // ========================================================================
    // Writes
    // ========================================================================

    /// Persist a scored memory and return it with its assigned id
    fn insert_memory(&self, input: &NewMemory) -> Result<MemoryRecord>;

    /// Atomically write new importance and `last_decay_at` values for one
    /// owner's records. Returns the number of records updated.
    fn apply_decay_batch(&self, owner_id: &str, updates: &[ImportanceUpdate]) -> Result<usize>;

    /// Atomically delete records of one owner. Ids owned by someone else
    /// fail the whole call.
    fn delete_records(&self, owner_id: &str, ids: &[MemoryId]) -> Result<usize>;

    /// Retrieval-path hook: bump `access_count` and `last_accessed_at`
    fn record_access(&self, id: MemoryId, at: DateTime<Utc>) -> Result<()>;

    // ========================================================================
    // Reads
    // ========================================================================

    fn get_memory(&self, id: MemoryId) -> Result<Option<MemoryRecord>>;

    /// All records of one owner
    fn get_owner_memories(&self, owner_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Records of one owner last decayed at or before `due_before`
    fn get_decay_candidates(
        &self,
        owner_id: &str,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .get_owner_memories(owner_id)?
            .into_iter()
            .filter(|record| record.last_decay_at <= due_before)
            .collect())
    }

    /// Every owner holding at least one record
    fn list_owners(&self) -> Result<Vec<OwnerId>>;

    fn count(&self, owner_id: &str) -> Result<usize>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Short name of the backend (e.g. "sqlite-wal")
    fn backend_name(&self) -> &'static str;
}
