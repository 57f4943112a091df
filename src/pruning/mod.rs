//! Safety-bounded pruning
//!
//! Removes an owner's least important memories while never dropping the
//! owner below `min_safe_count` and never removing more than
//! `max_prune_percent` of its records in one operation. Refusals are
//! reported as aborted [`PruneResult`]s, not errors.

pub mod selection;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ConfigHandle, RetentionConfig};
use crate::error::{Result, RetentionError};
use crate::storage::{MemoryStore, OwnerLocks};
use crate::telemetry::Telemetry;
use crate::types::{PruneOptions, PruneRecommendation, PruneResult};

pub use selection::{max_removable, plan_prune, prune_order, PruneLimits, PrunePlan};

/// Executes prunes and previews against a [`MemoryStore`]
#[derive(Clone)]
pub struct PruningEngine {
    store: Arc<dyn MemoryStore>,
    locks: Arc<OwnerLocks>,
    config: ConfigHandle,
    telemetry: Arc<Telemetry>,
}

fn limits(config: &RetentionConfig) -> PruneLimits {
    PruneLimits {
        min_safe_count: config.min_safe_count,
        max_prune_percent: config.max_prune_percent,
        default_threshold: config.prune_importance_threshold,
    }
}

fn check_options(options: &PruneOptions) -> Result<()> {
    if let Some(threshold) = options.min_importance_threshold {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(RetentionError::Validation(format!(
                "prune threshold must be in [0.0, 1.0], got {}",
                threshold
            )));
        }
    }
    Ok(())
}

fn owner_arg(owner_id: &str) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(RetentionError::Validation(
            "owner_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl PruningEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        locks: Arc<OwnerLocks>,
        config: ConfigHandle,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            store,
            locks,
            config,
            telemetry,
        }
    }

    /// Prune under the owner's lock. The count, candidate set and deletion
    /// all see the same snapshot.
    pub fn prune(&self, owner_id: &str, options: &PruneOptions) -> Result<PruneResult> {
        owner_arg(owner_id)?;
        check_options(options)?;
        let config = self.config.current();

        let _guard = self.locks.lock(owner_id);
        let records = self.store.get_owner_memories(owner_id)?;
        let plan = plan_prune(&records, options, &limits(&config));

        let result = match plan.abort {
            Some(reason) => {
                info!(
                    owner = owner_id,
                    count = plan.pre_count,
                    candidates = plan.candidate_count,
                    requested = options.target_removal_count,
                    reason = %reason,
                    "Prune aborted"
                );
                PruneResult::abort(
                    owner_id,
                    plan.pre_count,
                    reason,
                    plan.clamped_target,
                    plan.candidate_count,
                    false,
                )
            }
            None => {
                let ids = plan.selected_ids();
                let removed = self.store.delete_records(owner_id, &ids)?;
                let result = PruneResult {
                    owner_id: owner_id.to_string(),
                    pre_count: plan.pre_count,
                    removed_count: removed,
                    remaining_count: plan.pre_count - removed,
                    aborted: false,
                    abort_reason: None,
                    clamped_target: plan.clamped_target,
                    candidate_count: plan.candidate_count,
                    average_importance_removed: plan.average_importance(),
                    removed_ids: ids,
                    preview: false,
                };
                info!(
                    owner = owner_id,
                    removed = result.removed_count,
                    remaining = result.remaining_count,
                    avg_importance = result.average_importance_removed,
                    forced = options.force,
                    "Pruned memories"
                );
                result
            }
        };

        self.telemetry.record_prune(&result);
        Ok(result)
    }

    /// What [`prune`](Self::prune) would do right now. Runs without the
    /// owner lock, so the answer is advisory.
    pub fn preview(&self, owner_id: &str, options: &PruneOptions) -> Result<PruneResult> {
        owner_arg(owner_id)?;
        check_options(options)?;
        let config = self.config.current();

        let records = self.store.get_owner_memories(owner_id)?;
        let plan = plan_prune(&records, options, &limits(&config));
        debug!(
            owner = owner_id,
            would_remove = plan.selected.len(),
            aborted = plan.abort.is_some(),
            "Prune preview"
        );

        Ok(match plan.abort {
            Some(reason) => PruneResult::abort(
                owner_id,
                plan.pre_count,
                reason,
                plan.clamped_target,
                plan.candidate_count,
                true,
            ),
            None => PruneResult {
                owner_id: owner_id.to_string(),
                pre_count: plan.pre_count,
                removed_count: plan.selected.len(),
                remaining_count: plan.pre_count - plan.selected.len(),
                aborted: false,
                abort_reason: None,
                clamped_target: plan.clamped_target,
                candidate_count: plan.candidate_count,
                average_importance_removed: plan.average_importance(),
                removed_ids: plan.selected_ids(),
                preview: true,
            },
        })
    }

    /// Removal a scheduler-triggered prune asks for, if the owner is over the
    /// auto-prune threshold
    pub fn auto_prune_request(config: &RetentionConfig, count: usize) -> Option<PruneOptions> {
        if !config.enable_auto_pruning {
            return None;
        }
        Self::reduction_request(config, count)
    }

    fn reduction_request(config: &RetentionConfig, count: usize) -> Option<PruneOptions> {
        if count <= config.auto_prune_threshold {
            return None;
        }
        let target = count.saturating_sub(config.auto_prune_target_count());
        Some(PruneOptions {
            target_removal_count: target,
            min_importance_threshold: Some(config.prune_importance_threshold),
            force: false,
        })
    }

    /// Whether an owner has outgrown the auto-prune threshold and what a
    /// threshold-driven prune would take. Advisory, like a preview.
    pub fn recommend(&self, owner_id: &str) -> Result<PruneRecommendation> {
        owner_arg(owner_id)?;
        let config = self.config.current();
        let records = self.store.get_owner_memories(owner_id)?;

        let mut recommendation = PruneRecommendation {
            owner_id: owner_id.to_string(),
            needs_pruning: false,
            current_count: records.len(),
            target_count: config.auto_prune_target_count(),
            would_prune: 0,
            average_importance: 0.0,
            importance_range: None,
            abort_reason: None,
        };
        let Some(options) = Self::reduction_request(&config, records.len()) else {
            return Ok(recommendation);
        };

        let plan = plan_prune(&records, &options, &limits(&config));
        recommendation.needs_pruning = true;
        recommendation.abort_reason = plan.abort;
        recommendation.would_prune = plan.selected.len();
        recommendation.average_importance = plan.average_importance();
        recommendation.importance_range = plan
            .selected
            .first()
            .zip(plan.selected.last())
            .map(|((_, low), (_, high))| (*low, *high));
        Ok(recommendation)
    }
}
