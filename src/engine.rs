//! Caller-facing retention engine
//!
//! Ties scoring, storage, decay and pruning together behind one handle. The
//! engine owns its scheduler task; there is no global scheduler state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ConfigHandle, RetentionConfig};
use crate::decay::{DecayHandle, DecayRunner, DecayScheduler};
use crate::error::{Result, RetentionError};
use crate::intelligence::{
    CompiledKeywords, FeatureExtractor, ImportanceBreakdown, ImportanceScorer, ScoringContext,
};
use crate::pruning::PruningEngine;
use crate::storage::{MemoryStore, OwnerLocks, SqliteBackend};
use crate::telemetry::{CycleMetrics, DecayStats, PruneStats, Telemetry};
use crate::types::{
    ImportanceHistogram, MemoryId, MemoryKind, MemoryRecord, MemoryStats, NewMemory,
    PruneOptions, PruneRecommendation, PruneResult, StorageConfig, Visibility,
};

/// Result of [`RetentionEngine::start_decay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Memory relevance and retention engine
pub struct RetentionEngine {
    store: Arc<dyn MemoryStore>,
    config: ConfigHandle,
    telemetry: Arc<Telemetry>,
    extractor: FeatureExtractor,
    pruner: PruningEngine,
    runner: DecayRunner,
    scheduler: Mutex<Option<DecayHandle>>,
}

impl RetentionEngine {
    pub fn new(store: Arc<dyn MemoryStore>, config: RetentionConfig) -> Result<Self> {
        let config = ConfigHandle::new(config)?;
        let locks = Arc::new(OwnerLocks::new());
        let telemetry = Arc::new(Telemetry::new());
        let pruner = PruningEngine::new(
            store.clone(),
            locks.clone(),
            config.clone(),
            telemetry.clone(),
        );
        let runner = DecayRunner::new(store.clone(), locks, config.clone(), telemetry.clone());

        Ok(Self {
            store,
            config,
            telemetry,
            extractor: FeatureExtractor::default(),
            pruner,
            runner,
            scheduler: Mutex::new(None),
        })
    }

    /// Engine backed by a SQLite database
    pub fn open(storage: StorageConfig, config: RetentionConfig) -> Result<Self> {
        let store = SqliteBackend::new(storage)?;
        Self::new(Arc::new(store), config)
    }

    /// Engine backed by an in-memory SQLite database
    pub fn in_memory(config: RetentionConfig) -> Result<Self> {
        Self::new(Arc::new(SqliteBackend::in_memory()?), config)
    }

    /// Swap the keyword tables used for feature extraction
    pub fn with_keywords(mut self, keywords: Arc<CompiledKeywords>) -> Self {
        self.extractor = FeatureExtractor::new(keywords);
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    /// Initial importance for new content. Pure; touches no storage.
    pub fn score_new_memory(
        &self,
        content: &str,
        context: &ScoringContext,
        kind: MemoryKind,
    ) -> f32 {
        self.explain_score(content, context, kind).score
    }

    /// Per-factor breakdown of the score new content would get
    pub fn explain_score(
        &self,
        content: &str,
        context: &ScoringContext,
        kind: MemoryKind,
    ) -> ImportanceBreakdown {
        let features = self.extractor.extract(content, context);
        ImportanceScorer::from_config(&self.config.current()).breakdown(&features, kind)
    }

    /// Score and persist a new memory
    pub fn store_memory(
        &self,
        owner_id: &str,
        content: &str,
        context: &ScoringContext,
        kind: MemoryKind,
        visibility: Visibility,
    ) -> Result<MemoryRecord> {
        let importance = self.score_new_memory(content, context, kind);
        let record = self.store.insert_memory(&NewMemory {
            owner_id: owner_id.to_string(),
            content_digest: self.extractor.digest(content, context),
            memory_kind: kind,
            importance,
            visibility,
            topic_drift_count: 0,
            created_at: None,
        })?;
        tracing::debug!(
            owner = owner_id,
            memory = record.id,
            kind = %kind,
            importance,
            "Stored memory"
        );
        Ok(record)
    }

    /// Retrieval-path hook: count an access to a memory
    pub fn record_access(&self, id: MemoryId) -> Result<()> {
        self.store.record_access(id, chrono::Utc::now())
    }

    // ========================================================================
    // Decay
    // ========================================================================

    /// Start the background decay loop. Idempotent.
    pub fn start_decay(&self) -> Result<StartOutcome> {
        let mut scheduler = self.scheduler.lock();
        if scheduler.as_ref().is_some_and(|handle| handle.is_running()) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        *scheduler = Some(DecayScheduler::spawn(self.runner.clone())?);
        Ok(StartOutcome::Started)
    }

    /// Stop the background loop and wait for it to exit. Returns whether a
    /// loop was running.
    pub async fn stop_decay(&self) -> Result<bool> {
        let handle = self.scheduler.lock().take();
        match handle {
            Some(handle) => {
                handle.stop().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_decay_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.is_running())
    }

    pub fn decay_stats(&self) -> DecayStats {
        self.telemetry
            .decay_stats(self.is_decay_running(), &self.config.current())
    }

    /// Recent cycle metrics, oldest first
    pub fn decay_history(&self) -> Vec<CycleMetrics> {
        self.telemetry.decay_history()
    }

    /// Run one decay cycle immediately, independent of the background loop
    pub async fn run_decay_cycle(&self) -> CycleMetrics {
        self.runner.run_cycle().await
    }

    /// Reduce every memory of one owner by `decay_factor` (0.1 = 10% off)
    pub fn force_decay_owner(&self, owner_id: &str, decay_factor: f32) -> Result<CycleMetrics> {
        self.runner.force_decay_owner(owner_id, decay_factor)
    }

    // ========================================================================
    // Pruning
    // ========================================================================

    pub fn prune(&self, owner_id: &str, options: &PruneOptions) -> Result<PruneResult> {
        self.pruner.prune(owner_id, options)
    }

    /// Advisory dry run of [`prune`](Self::prune)
    pub fn prune_preview(&self, owner_id: &str, options: &PruneOptions) -> Result<PruneResult> {
        self.pruner.preview(owner_id, options)
    }

    /// Whether an owner has outgrown the auto-prune threshold, and what a
    /// threshold-driven prune would remove
    pub fn recommend_pruning(&self, owner_id: &str) -> Result<PruneRecommendation> {
        self.pruner.recommend(owner_id)
    }

    pub fn prune_stats(&self) -> PruneStats {
        self.telemetry.prune_stats()
    }

    // ========================================================================
    // Stats & configuration
    // ========================================================================

    /// Count and importance distribution of one owner's memories
    pub fn get_memory_stats(&self, owner_id: &str) -> Result<MemoryStats> {
        if owner_id.trim().is_empty() {
            return Err(RetentionError::Validation(
                "owner_id must not be empty".to_string(),
            ));
        }
        let threshold = self.config.current().prune_importance_threshold;
        let scores: Vec<f32> = self
            .store
            .get_owner_memories(owner_id)?
            .iter()
            .map(|record| record.importance)
            .collect();

        let count = scores.len();
        let (min, max, sum) = scores.iter().fold(
            (f32::MAX, f32::MIN, 0.0f64),
            |(min, max, sum), &s| (min.min(s), max.max(s), sum + s as f64),
        );

        Ok(MemoryStats {
            owner_id: owner_id.to_string(),
            count,
            importance_histogram: ImportanceHistogram::from_scores(scores.iter().copied()),
            avg_importance: if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            },
            min_importance: if count == 0 { 0.0 } else { min },
            max_importance: if count == 0 { 0.0 } else { max },
            below_prune_threshold: scores.iter().filter(|&&s| s < threshold).count(),
        })
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> Arc<RetentionConfig> {
        self.config.current()
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    /// Validate and apply a new configuration. A running scheduler picks it
    /// up without restarting.
    pub fn reload_config(&self, config: RetentionConfig) -> Result<()> {
        self.config.reload(config)?;
        info!(running = self.is_decay_running(), "Engine configuration updated");
        Ok(())
    }
}
