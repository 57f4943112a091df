//! Background decay scheduler
//!
//! A single tokio task wakes every `decay_interval_ms`, decays each owner's
//! due records in one atomic batch per owner, and triggers auto-pruning for
//! owners past the size threshold. Store calls run on the blocking pool, so
//! an owner batch that has started always completes, even across shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::functions::{decay, scale};
use crate::config::{ConfigHandle, DecayMode, RetentionConfig};
use crate::error::{Result, RetentionError};
use crate::pruning::PruningEngine;
use crate::storage::{MemoryStore, OwnerLocks};
use crate::telemetry::{CycleMetrics, Telemetry, FAILED_CYCLE_WARN_THRESHOLD};
use crate::types::{ImportanceUpdate, MemoryRecord};

/// Executes decay cycles; cheap to clone
#[derive(Clone)]
pub struct DecayRunner {
    store: Arc<dyn MemoryStore>,
    locks: Arc<OwnerLocks>,
    config: ConfigHandle,
    telemetry: Arc<Telemetry>,
    pruner: PruningEngine,
}

/// Outcome of decaying one record
enum RecordDecay {
    Protected,
    Unchanged,
    Decayed(ImportanceUpdate, f32),
}

/// Elapsed time between two instants in configured time units
fn elapsed_units(from: DateTime<Utc>, to: DateTime<Utc>, unit_secs: f64) -> f64 {
    let delta = to - from;
    let secs = match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    };
    secs / unit_secs
}

fn decay_record(
    record: &MemoryRecord,
    config: &RetentionConfig,
    mode: DecayMode,
    now: DateTime<Utc>,
) -> Result<RecordDecay> {
    if let Some(protected) = config.protected_importance {
        if record.importance >= protected {
            return Ok(RecordDecay::Protected);
        }
    }
    if config.access_protection_secs > 0 {
        if let Some(accessed) = record.last_accessed_at {
            if now - accessed < config.access_protection_window()? {
                return Ok(RecordDecay::Protected);
            }
        }
    }

    let elapsed = elapsed_units(record.last_decay_at, now, config.decay_time_unit_secs);
    let importance = decay(
        mode,
        record.importance,
        config.decay_rate_for(record.access_count),
        elapsed,
        config.decay_min_importance,
        config.decay_step_size,
    )?;
    if importance >= record.importance {
        return Ok(RecordDecay::Unchanged);
    }

    // Step decay only consumes whole steps; the remainder keeps accruing
    let last_decay_at = if mode == DecayMode::Step {
        let steps = (elapsed / config.decay_step_size).floor();
        let consumed_secs = steps * config.decay_step_size * config.decay_time_unit_secs;
        let stamped = record.last_decay_at
            + chrono::Duration::microseconds((consumed_secs * 1_000_000.0) as i64);
        stamped.min(now)
    } else {
        now
    };

    Ok(RecordDecay::Decayed(
        ImportanceUpdate {
            id: record.id,
            importance,
            last_decay_at,
        },
        record.importance - importance,
    ))
}

impl DecayRunner {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        locks: Arc<OwnerLocks>,
        config: ConfigHandle,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let pruner = PruningEngine::new(
            store.clone(),
            locks.clone(),
            config.clone(),
            telemetry.clone(),
        );
        Self {
            store,
            locks,
            config,
            telemetry,
            pruner,
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Decay one owner's due records and write them in one batch.
    /// Blocking; holds the owner lock only for the read-compute-write span.
    pub fn decay_owner(&self, owner_id: &str, now: DateTime<Utc>) -> Result<CycleMetrics> {
        let config = self.config.current();
        let mode = config.effective_decay_mode();
        let mut metrics = CycleMetrics {
            owners_processed: 1,
            ..Default::default()
        };

        if mode != DecayMode::None {
            let _guard = self.locks.lock(owner_id);
            let due_before = now
                .checked_sub_signed(config.min_decay_gap()?)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let records = self.store.get_decay_candidates(owner_id, due_before)?;
            metrics.records_examined = records.len();

            let mut updates = Vec::new();
            for record in &records {
                match decay_record(record, &config, mode, now) {
                    Ok(RecordDecay::Protected) => metrics.records_protected += 1,
                    Ok(RecordDecay::Unchanged) => {}
                    Ok(RecordDecay::Decayed(update, amount)) => {
                        metrics.total_decay_amount += amount as f64;
                        updates.push(update);
                    }
                    Err(e) => {
                        warn!(
                            owner = owner_id,
                            memory = record.id,
                            error = %e,
                            "Skipping record during decay"
                        );
                        metrics.records_failed += 1;
                    }
                }
            }

            if !updates.is_empty() {
                self.store.apply_decay_batch(owner_id, &updates)?;
            }
            metrics.records_decayed = updates.len();
            self.telemetry.mark_owner_decayed(owner_id, now);
            debug!(
                owner = owner_id,
                examined = metrics.records_examined,
                decayed = metrics.records_decayed,
                protected = metrics.records_protected,
                "Owner decay batch written"
            );
        }

        self.auto_prune(owner_id, &config, &mut metrics);
        Ok(metrics)
    }

    /// Best-effort prune for owners over the auto-prune threshold
    fn auto_prune(&self, owner_id: &str, config: &RetentionConfig, metrics: &mut CycleMetrics) {
        if !config.enable_auto_pruning {
            return;
        }
        let count = match self.store.count(owner_id) {
            Ok(count) => count,
            Err(e) => {
                error!(owner = owner_id, error = %e, "Auto-prune count failed");
                return;
            }
        };
        let Some(options) = PruningEngine::auto_prune_request(config, count) else {
            return;
        };

        metrics.auto_prunes_triggered += 1;
        match self.pruner.prune(owner_id, &options) {
            Ok(result) if result.aborted => {
                warn!(
                    owner = owner_id,
                    count,
                    requested = options.target_removal_count,
                    reason = ?result.abort_reason,
                    "Auto-prune aborted"
                );
            }
            Ok(result) => metrics.auto_pruned_records += result.removed_count,
            Err(e) => error!(owner = owner_id, error = %e, "Auto-prune failed"),
        }
    }

    /// Run one owner batch on the blocking pool
    async fn run_owner(&self, owner_id: String, now: DateTime<Utc>) -> CycleMetrics {
        let runner = self.clone();
        let owner = owner_id.clone();
        let outcome = tokio::task::spawn_blocking(move || runner.decay_owner(&owner, now)).await;

        let failure = match outcome {
            Ok(Ok(metrics)) => return metrics,
            Ok(Err(e)) => e,
            Err(join) => RetentionError::Internal(format!("decay task panicked: {}", join)),
        };
        error!(owner = %owner_id, error = %failure, "Owner decay batch failed");
        CycleMetrics {
            owners_processed: 1,
            owners_failed: 1,
            ..Default::default()
        }
    }

    /// Run a full decay cycle now
    pub async fn run_cycle(&self) -> CycleMetrics {
        self.run_cycle_until(None).await
    }

    /// Run a decay cycle. Once `shutdown` flips, owners not yet started are
    /// skipped while in-flight batches finish.
    pub(crate) async fn run_cycle_until(
        &self,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> CycleMetrics {
        let started = Instant::now();
        let now = Utc::now();
        let config = self.config.current();
        let mut cycle = CycleMetrics {
            started_at: Some(now),
            ..Default::default()
        };

        let store = self.store.clone();
        let owners = match tokio::task::spawn_blocking(move || store.list_owners()).await {
            Ok(Ok(owners)) => owners,
            Ok(Err(e)) => {
                error!(error = %e, "Decay cycle could not list owners");
                cycle.error = Some(e.to_string());
                return self.finish_cycle(cycle, started);
            }
            Err(join) => {
                error!(error = %join, "Decay cycle could not list owners");
                cycle.error = Some(join.to_string());
                return self.finish_cycle(cycle, started);
            }
        };

        let mut owners = self.telemetry.rotation_order(owners);
        if let Some(limit) = config.max_owners_per_cycle {
            owners.truncate(limit);
        }

        let results: Vec<CycleMetrics> = stream::iter(owners)
            .map(|owner| {
                let shutdown = shutdown.clone();
                async move {
                    if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                        return None;
                    }
                    Some(self.run_owner(owner, now).await)
                }
            })
            .buffer_unordered(config.max_concurrent_owners)
            .filter_map(|metrics| async move { metrics })
            .collect()
            .await;

        for owner in &results {
            cycle.absorb(owner);
        }
        self.finish_cycle(cycle, started)
    }

    fn finish_cycle(&self, mut cycle: CycleMetrics, started: Instant) -> CycleMetrics {
        cycle.duration_ms = started.elapsed().as_millis() as u64;
        let failures = self.telemetry.record_cycle(cycle.clone());

        info!(
            owners = cycle.owners_processed,
            failed_owners = cycle.owners_failed,
            decayed = cycle.records_decayed,
            failed_records = cycle.records_failed,
            auto_prunes = cycle.auto_prunes_triggered,
            duration_ms = cycle.duration_ms,
            "Decay cycle complete"
        );
        if failures >= FAILED_CYCLE_WARN_THRESHOLD {
            warn!(
                consecutive_failures = failures,
                "Decay cycles keep failing; check the memory store"
            );
        }
        cycle
    }

    /// Multiply every record of one owner by `1 - decay_factor`, floor
    /// respected, under the owner lock
    pub fn force_decay_owner(&self, owner_id: &str, decay_factor: f32) -> Result<CycleMetrics> {
        if !decay_factor.is_finite() || !(0.0..=1.0).contains(&decay_factor) {
            return Err(RetentionError::Validation(format!(
                "decay factor must be in [0.0, 1.0], got {}",
                decay_factor
            )));
        }
        let config = self.config.current();
        let now = Utc::now();
        let mut metrics = CycleMetrics {
            started_at: Some(now),
            owners_processed: 1,
            ..Default::default()
        };

        let _guard = self.locks.lock(owner_id);
        let records = self.store.get_owner_memories(owner_id)?;
        metrics.records_examined = records.len();

        let mut updates = Vec::new();
        for record in &records {
            let importance = scale(
                record.importance,
                1.0 - decay_factor,
                config.decay_min_importance,
            )?;
            if importance < record.importance {
                metrics.total_decay_amount += (record.importance - importance) as f64;
                updates.push(ImportanceUpdate {
                    id: record.id,
                    importance,
                    last_decay_at: now,
                });
            }
        }
        self.store.apply_decay_batch(owner_id, &updates)?;
        metrics.records_decayed = updates.len();

        info!(
            owner = owner_id,
            factor = decay_factor,
            decayed = metrics.records_decayed,
            "Forced decay applied"
        );
        Ok(metrics)
    }
}

/// Handle to a running scheduler task
pub struct DecayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DecayHandle {
    /// Whether the background task is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit. Any owner batch in
    /// progress completes first.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| RetentionError::Scheduler(format!("decay task failed: {}", e)))
    }
}

/// Spawns the periodic decay loop
pub struct DecayScheduler;

impl DecayScheduler {
    /// Start the loop on the current tokio runtime
    pub fn spawn(runner: DecayRunner) -> Result<DecayHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RetentionError::Scheduler("decay scheduler needs a tokio runtime".to_string())
        })?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(Self::run(runner, shutdown_rx));
        Ok(DecayHandle { shutdown, task })
    }

    async fn run(runner: DecayRunner, mut shutdown: watch::Receiver<bool>) {
        let mut config_rx = runner.config().subscribe();
        let mut config_open = true;
        let mut last_tick = Instant::now();

        info!(
            interval_ms = runner.config().current().decay_interval_ms,
            "Decay scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let deadline = last_tick + runner.config().current().decay_interval();

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                changed = config_rx.changed(), if config_open => {
                    // New interval takes effect from the same last tick
                    if changed.is_err() {
                        config_open = false;
                    }
                    continue;
                }
            }

            last_tick = Instant::now();
            runner.run_cycle_until(Some(shutdown.clone())).await;
        }

        info!("Decay scheduler stopped");
    }
}
