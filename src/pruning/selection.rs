//! Pure prune planning
//!
//! Given an owner's full record set, decide what a prune would remove. No I/O
//! and no locking, so the same plan backs real prunes and previews.

use std::cmp::Ordering;

use crate::types::{AbortReason, MemoryId, MemoryRecord, PruneOptions};

/// Limits a prune must respect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneLimits {
    pub min_safe_count: usize,
    pub max_prune_percent: f32,
    /// Threshold used when the options carry none
    pub default_threshold: f32,
}

/// What a prune would do
#[derive(Debug, Clone, PartialEq)]
pub struct PrunePlan {
    pub pre_count: usize,
    pub candidate_count: usize,
    pub clamped_target: usize,
    /// Records to remove with their importance, lowest first
    pub selected: Vec<(MemoryId, f32)>,
    pub abort: Option<AbortReason>,
}

impl PrunePlan {
    pub fn selected_ids(&self) -> Vec<MemoryId> {
        self.selected.iter().map(|(id, _)| *id).collect()
    }

    pub fn average_importance(&self) -> f32 {
        if self.selected.is_empty() {
            0.0
        } else {
            self.selected.iter().map(|(_, imp)| *imp).sum::<f32>() / self.selected.len() as f32
        }
    }
}

/// Most records a single prune may remove from an owner holding `count`
pub fn max_removable(count: usize, min_safe_count: usize, max_prune_percent: f32) -> usize {
    let by_percent = (count as f64 * max_prune_percent as f64).floor() as usize;
    by_percent.min(count.saturating_sub(min_safe_count))
}

/// Eviction order: lowest importance, then least recently accessed (never
/// accessed first), then oldest, then lowest id
pub fn prune_order(a: &MemoryRecord, b: &MemoryRecord) -> Ordering {
    a.importance
        .total_cmp(&b.importance)
        .then_with(|| a.lru_key().cmp(&b.lru_key()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Decide which records a prune removes
pub fn plan_prune(
    records: &[MemoryRecord],
    options: &PruneOptions,
    limits: &PruneLimits,
) -> PrunePlan {
    let pre_count = records.len();
    let threshold = options
        .min_importance_threshold
        .unwrap_or(limits.default_threshold);

    let mut candidates: Vec<&MemoryRecord> = records
        .iter()
        .filter(|record| record.importance < threshold)
        .collect();
    let candidate_count = candidates.len();

    if pre_count <= limits.min_safe_count {
        return PrunePlan {
            pre_count,
            candidate_count,
            clamped_target: 0,
            selected: Vec::new(),
            abort: Some(AbortReason::BelowMinimumSafeCount),
        };
    }

    let requested = options.target_removal_count;
    let clamped_target = requested.min(max_removable(
        pre_count,
        limits.min_safe_count,
        limits.max_prune_percent,
    ));

    if candidate_count < clamped_target && !options.force {
        return PrunePlan {
            pre_count,
            candidate_count,
            clamped_target,
            selected: Vec::new(),
            abort: Some(AbortReason::InsufficientCandidates),
        };
    }

    candidates.sort_by(|a, b| prune_order(a, b));
    let selected = candidates
        .into_iter()
        .take(clamped_target)
        .map(|record| (record.id, record.importance))
        .collect();

    PrunePlan {
        pre_count,
        candidate_count,
        clamped_target,
        selected,
        abort: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentDigest, MemoryKind, Visibility};
    use chrono::{Duration, Utc};

    const LIMITS: PruneLimits = PruneLimits {
        min_safe_count: 10,
        max_prune_percent: 0.25,
        default_threshold: 0.6,
    };

    fn record(id: MemoryId, importance: f32) -> MemoryRecord {
        let created = Utc::now() - Duration::days(30) + Duration::seconds(id);
        MemoryRecord {
            id,
            owner_id: "aria".to_string(),
            content_digest: ContentDigest::default(),
            memory_kind: MemoryKind::Conversation,
            importance,
            created_at: created,
            last_decay_at: created,
            last_accessed_at: None,
            access_count: 0,
            visibility: Visibility::Private,
            topic_drift_count: 0,
        }
    }

    fn owner(low: usize, high: usize) -> Vec<MemoryRecord> {
        (0..low)
            .map(|i| record(i as i64, 0.1 + 0.001 * i as f32))
            .chain((low..low + high).map(|i| record(i as i64, 0.9)))
            .collect()
    }

    #[test]
    fn test_insufficient_candidates_abort() {
        let plan = plan_prune(&owner(3, 17), &PruneOptions::new(5), &LIMITS);
        assert_eq!(plan.abort, Some(AbortReason::InsufficientCandidates));
        assert!(plan.selected.is_empty());
        assert_eq!(plan.candidate_count, 3);
        assert_eq!(plan.clamped_target, 5);
    }

    #[test]
    fn test_candidates_checked_against_clamped_target() {
        // 100 records asked for 40: clamped to 25, so 25..40 candidates suffice
        for low in [25, 30, 39] {
            let plan = plan_prune(&owner(low, 100 - low), &PruneOptions::new(40), &LIMITS);
            assert_eq!(plan.abort, None, "{} candidates", low);
            assert_eq!(plan.clamped_target, 25);
            assert_eq!(plan.selected_ids(), (0..25).collect::<Vec<_>>());
        }

        let plan = plan_prune(&owner(24, 76), &PruneOptions::new(40), &LIMITS);
        assert_eq!(plan.abort, Some(AbortReason::InsufficientCandidates));
    }

    #[test]
    fn test_min_safe_clamp_can_satisfy_request() {
        // 12 records, 3 candidates, asked for 5: only 2 may go
        let plan = plan_prune(&owner(3, 9), &PruneOptions::new(5), &LIMITS);
        assert_eq!(plan.abort, None);
        assert_eq!(plan.clamped_target, 2);
        assert_eq!(plan.selected_ids(), vec![0, 1]);
    }

    #[test]
    fn test_percentage_clamp() {
        let plan = plan_prune(&owner(50, 50), &PruneOptions::new(40), &LIMITS);
        assert_eq!(plan.abort, None);
        assert_eq!(plan.clamped_target, 25);
        assert_eq!(plan.selected.len(), 25);
        // The 25 lowest are ids 0..25
        assert_eq!(plan.selected_ids(), (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_at_min_safe_count_aborts() {
        let plan = plan_prune(&owner(10, 0), &PruneOptions::new(1).forced(), &LIMITS);
        assert_eq!(plan.abort, Some(AbortReason::BelowMinimumSafeCount));
    }

    #[test]
    fn test_force_takes_what_is_available() {
        let plan = plan_prune(&owner(30, 70), &PruneOptions::new(40).forced(), &LIMITS);
        assert_eq!(plan.abort, None);
        assert_eq!(plan.selected.len(), 25);

        let plan = plan_prune(&owner(3, 97), &PruneOptions::new(40).forced(), &LIMITS);
        assert_eq!(plan.selected.len(), 3);
    }

    #[test]
    fn test_min_safe_bound_tighter_than_percent() {
        // 12 records: 25% allows 3, min_safe allows 2
        let plan = plan_prune(&owner(12, 0), &PruneOptions::new(3), &LIMITS);
        assert_eq!(plan.clamped_target, 2);
        assert_eq!(plan.selected.len(), 2);
    }

    #[test]
    fn test_zero_target() {
        let plan = plan_prune(&owner(20, 20), &PruneOptions::new(0), &LIMITS);
        assert_eq!(plan.abort, None);
        assert!(plan.selected.is_empty());
    }

    #[test]
    fn test_custom_threshold() {
        let records = owner(5, 15);
        let plan = plan_prune(&records, &PruneOptions::new(5).with_threshold(0.95), &LIMITS);
        assert_eq!(plan.candidate_count, 20);
        assert_eq!(plan.selected.len(), 5);
    }

    #[test]
    fn test_lru_tie_break() {
        let now = Utc::now();
        let mut records: Vec<MemoryRecord> = (0..20).map(|i| record(i, 0.3)).collect();
        // Everything accessed except id 7; id 3 accessed longest ago
        for r in records.iter_mut() {
            r.last_accessed_at = Some(now);
        }
        records[7].last_accessed_at = None;
        records[3].last_accessed_at = Some(now - Duration::days(3));

        let plan = plan_prune(&records, &PruneOptions::new(3), &LIMITS);
        assert_eq!(plan.selected_ids(), vec![7, 3, 0]);
    }

    #[test]
    fn test_max_removable() {
        assert_eq!(max_removable(100, 10, 0.25), 25);
        assert_eq!(max_removable(12, 10, 0.25), 2);
        assert_eq!(max_removable(5, 10, 0.25), 0);
        assert_eq!(max_removable(100, 10, 1.0), 90);
    }
}
