//! Decay and pruning telemetry
//!
//! Counters and bounded histories shared between the scheduler, the pruning
//! engine and callers. Snapshots are cheap clones taken under a short lock.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{DecayMode, RetentionConfig};
use crate::types::{OwnerId, PruneResult};

/// Number of decay cycles kept in the rolling history
pub const DECAY_HISTORY_LIMIT: usize = 100;

/// Ticks in a row that fail completely before a warning is logged
pub const FAILED_CYCLE_WARN_THRESHOLD: u32 = 3;

/// Metrics for a single decay cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub owners_processed: usize,
    pub owners_failed: usize,
    /// Records loaded as due for decay
    pub records_examined: usize,
    /// Records whose score actually went down
    pub records_decayed: usize,
    /// Records shielded by importance or recent access
    pub records_protected: usize,
    /// Records skipped because their decay could not be computed
    pub records_failed: usize,
    /// Sum of importance lost across decayed records
    pub total_decay_amount: f64,
    pub auto_prunes_triggered: usize,
    pub auto_pruned_records: usize,
    /// Set when the cycle could not even enumerate owners
    pub error: Option<String>,
}

impl CycleMetrics {
    /// The cycle failed outright, or every attempted owner failed
    pub fn fully_failed(&self) -> bool {
        self.error.is_some()
            || (self.owners_failed > 0 && self.owners_failed == self.owners_processed)
    }

    pub fn average_decay_amount(&self) -> f64 {
        if self.records_decayed == 0 {
            0.0
        } else {
            self.total_decay_amount / self.records_decayed as f64
        }
    }

    /// Fold one owner's batch into the cycle totals
    pub fn absorb(&mut self, owner: &CycleMetrics) {
        self.owners_processed += owner.owners_processed;
        self.owners_failed += owner.owners_failed;
        self.records_examined += owner.records_examined;
        self.records_decayed += owner.records_decayed;
        self.records_protected += owner.records_protected;
        self.records_failed += owner.records_failed;
        self.total_decay_amount += owner.total_decay_amount;
        self.auto_prunes_triggered += owner.auto_prunes_triggered;
        self.auto_pruned_records += owner.auto_pruned_records;
    }
}

/// Snapshot of the decay subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayStats {
    pub running: bool,
    pub mode: DecayMode,
    pub interval_ms: u64,
    pub auto_pruning: bool,
    pub auto_prune_threshold: usize,
    pub last_run: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub total_decayed: u64,
    pub total_failed_records: u64,
    pub total_auto_prunes: u64,
    pub consecutive_failed_cycles: u32,
    pub recent_cycle: Option<CycleMetrics>,
}

/// Snapshot of pruning history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneStats {
    pub operations: u64,
    pub aborted: u64,
    pub total_removed: u64,
    /// Mean importance over every removed record
    pub average_importance_removed: f32,
    pub last_prune: Option<DateTime<Utc>>,
    pub owners_last_pruned: HashMap<OwnerId, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TelemetryState {
    history: VecDeque<CycleMetrics>,
    cycles: u64,
    total_decayed: u64,
    total_failed_records: u64,
    total_auto_prunes: u64,
    consecutive_failed_cycles: u32,
    last_run: Option<DateTime<Utc>>,
    owners_last_decayed: HashMap<OwnerId, DateTime<Utc>>,

    prune_operations: u64,
    prune_aborted: u64,
    prune_total_removed: u64,
    prune_importance_sum: f64,
    last_prune: Option<DateTime<Utc>>,
    owners_last_pruned: HashMap<OwnerId, DateTime<Utc>>,
}

/// Shared telemetry sink
#[derive(Debug, Default)]
pub struct Telemetry {
    state: Mutex<TelemetryState>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished scheduler cycle; returns the consecutive failure count
    pub fn record_cycle(&self, metrics: CycleMetrics) -> u32 {
        let mut state = self.state.lock();
        state.cycles += 1;
        state.total_decayed += metrics.records_decayed as u64;
        state.total_failed_records += metrics.records_failed as u64;
        state.total_auto_prunes += metrics.auto_prunes_triggered as u64;
        state.last_run = metrics.started_at.or_else(|| Some(Utc::now()));
        if metrics.fully_failed() {
            state.consecutive_failed_cycles += 1;
        } else {
            state.consecutive_failed_cycles = 0;
        }
        if state.history.len() == DECAY_HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(metrics);
        state.consecutive_failed_cycles
    }

    /// Note that an owner's decay batch completed at `at`
    pub fn mark_owner_decayed(&self, owner_id: &str, at: DateTime<Utc>) {
        self.state
            .lock()
            .owners_last_decayed
            .insert(owner_id.to_string(), at);
    }

    /// Order owners so the least recently decayed come first.
    /// Owners never decayed lead, ties keep their input order.
    pub fn rotation_order(&self, owners: Vec<OwnerId>) -> Vec<OwnerId> {
        let state = self.state.lock();
        let mut keyed: Vec<(Option<DateTime<Utc>>, OwnerId)> = owners
            .into_iter()
            .map(|owner| (state.owners_last_decayed.get(&owner).copied(), owner))
            .collect();
        keyed.sort_by_key(|(last, _)| *last);
        keyed.into_iter().map(|(_, owner)| owner).collect()
    }

    pub fn record_prune(&self, result: &PruneResult) {
        if result.preview {
            return;
        }
        let mut state = self.state.lock();
        state.prune_operations += 1;
        if result.aborted {
            state.prune_aborted += 1;
            return;
        }
        if result.removed_count > 0 {
            let now = Utc::now();
            state.prune_total_removed += result.removed_count as u64;
            state.prune_importance_sum +=
                result.average_importance_removed as f64 * result.removed_count as f64;
            state.last_prune = Some(now);
            state
                .owners_last_pruned
                .insert(result.owner_id.clone(), now);
        }
    }

    pub fn decay_stats(&self, running: bool, config: &RetentionConfig) -> DecayStats {
        let state = self.state.lock();
        DecayStats {
            running,
            mode: config.effective_decay_mode(),
            interval_ms: config.decay_interval_ms,
            auto_pruning: config.enable_auto_pruning,
            auto_prune_threshold: config.auto_prune_threshold,
            last_run: state.last_run,
            cycles: state.cycles,
            total_decayed: state.total_decayed,
            total_failed_records: state.total_failed_records,
            total_auto_prunes: state.total_auto_prunes,
            consecutive_failed_cycles: state.consecutive_failed_cycles,
            recent_cycle: state.history.back().cloned(),
        }
    }

    /// Rolling history of recent cycles, oldest first
    pub fn decay_history(&self) -> Vec<CycleMetrics> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn prune_stats(&self) -> PruneStats {
        let state = self.state.lock();
        PruneStats {
            operations: state.prune_operations,
            aborted: state.prune_aborted,
            total_removed: state.prune_total_removed,
            average_importance_removed: if state.prune_total_removed == 0 {
                0.0
            } else {
                (state.prune_importance_sum / state.prune_total_removed as f64) as f32
            },
            last_prune: state.last_prune,
            owners_last_pruned: state.owners_last_pruned.clone(),
        }
    }
}
