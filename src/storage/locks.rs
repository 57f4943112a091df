//! Per-owner mutual exclusion
//!
//! Decay writes, prunes and forced decays for the same owner are serialized
//! through one mutex per owner. Different owners never contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Held lock for one owner; released on drop
pub type OwnerGuard = ArcMutexGuard<RawMutex, ()>;

/// Registry of per-owner locks, created on first use
#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, owner_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(owner_id) {
            return lock.clone();
        }
        self.locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Block until the owner's lock is held
    pub fn lock(&self, owner_id: &str) -> OwnerGuard {
        self.lock_for(owner_id).lock_arc()
    }
}
