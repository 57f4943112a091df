//! Core types for the retention engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a memory record
pub type MemoryId = i64;

/// Identifier of the persona/agent owning a memory set
pub type OwnerId = String;

/// Number of buckets in an importance histogram (0.0-0.1, 0.1-0.2, ... 0.9-1.0)
pub const HISTOGRAM_BUCKETS: usize = 10;

/// Maximum length of the diagnostic snippet kept in a [`ContentDigest`]
pub const SNIPPET_MAX_CHARS: usize = 80;

/// Kind of memory; each kind carries a retention multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    #[default]
    Conversation,
    Preference,
    Fact,
    Secret,
    Trauma,
    Routine,
    Observation,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 7] = [
        MemoryKind::Conversation,
        MemoryKind::Preference,
        MemoryKind::Fact,
        MemoryKind::Secret,
        MemoryKind::Trauma,
        MemoryKind::Routine,
        MemoryKind::Observation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Preference => "preference",
            MemoryKind::Fact => "fact",
            MemoryKind::Secret => "secret",
            MemoryKind::Trauma => "trauma",
            MemoryKind::Routine => "routine",
            MemoryKind::Observation => "observation",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversation" => Ok(MemoryKind::Conversation),
            "preference" => Ok(MemoryKind::Preference),
            "fact" => Ok(MemoryKind::Fact),
            "secret" => Ok(MemoryKind::Secret),
            "trauma" => Ok(MemoryKind::Trauma),
            "routine" => Ok(MemoryKind::Routine),
            "observation" => Ok(MemoryKind::Observation),
            _ => Err(format!("Unknown memory kind: {}", s)),
        }
    }
}

/// Visibility level. Irrelevant to scoring; preserved through every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Shared => "shared",
            Visibility::Public => "public",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "shared" => Ok(Visibility::Shared),
            "public" => Ok(Visibility::Public),
            _ => Err(format!("Unknown visibility: {}", s)),
        }
    }
}

/// Signals derived from memory text at extraction time.
///
/// The engine never needs the raw text after scoring; the snippet is kept
/// for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentDigest {
    /// Length of the text in characters
    pub text_length: usize,
    /// Emotion, significance and topic keywords detected in the text
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Number of exclamation marks
    #[serde(default)]
    pub exclamation_count: usize,
    /// Uppercase letters / alphabetic letters
    #[serde(default)]
    pub caps_ratio: f32,
    /// Leading text, truncated to [`SNIPPET_MAX_CHARS`]
    pub snippet: Option<String>,
}

/// A memory record as managed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub content_digest: ContentDigest,
    #[serde(rename = "kind")]
    pub memory_kind: MemoryKind,
    /// Importance score, always within `[decay_floor, 1.0]`
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub last_decay_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Incremented by the retrieval path only
    #[serde(default)]
    pub access_count: i64,
    #[serde(default)]
    pub visibility: Visibility,
    /// Conversation topic drifts observed while this memory was formed
    #[serde(default)]
    pub topic_drift_count: i64,
}

impl MemoryRecord {
    /// Timestamp used for least-recently-used ordering. Never-accessed
    /// records sort before every accessed one.
    pub fn lru_key(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }
}

/// Input for storing a new, already scored memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub owner_id: OwnerId,
    pub content_digest: ContentDigest,
    pub memory_kind: MemoryKind,
    pub importance: f32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub topic_drift_count: i64,
    /// Creation time; defaults to now when absent
    pub created_at: Option<DateTime<Utc>>,
}

/// A single decayed score to be written back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceUpdate {
    pub id: MemoryId,
    pub importance: f32,
    pub last_decay_at: DateTime<Utc>,
}

/// Options for a prune or prune preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneOptions {
    /// Number of records the caller wants removed
    pub target_removal_count: usize,
    /// Only records strictly below this importance are candidates.
    /// `None` uses the configured `prune_importance_threshold`.
    pub min_importance_threshold: Option<f32>,
    /// Remove as many candidates as allowed even when fewer than requested
    /// qualify. Never bypasses `min_safe_count` or `max_prune_percent`.
    #[serde(default)]
    pub force: bool,
}

impl PruneOptions {
    pub fn new(target_removal_count: usize) -> Self {
        Self {
            target_removal_count,
            min_importance_threshold: None,
            force: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.min_importance_threshold = Some(threshold);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Machine-readable reason for a safety abort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The owner holds `min_safe_count` records or fewer
    BelowMinimumSafeCount,
    /// Fewer records qualify than were requested
    InsufficientCandidates,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::BelowMinimumSafeCount => "below minimum safe count",
            AbortReason::InsufficientCandidates => "insufficient low-importance memories",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a prune or prune preview.
///
/// A safety abort is a successful result with `aborted == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneResult {
    pub owner_id: OwnerId,
    /// Owner record count observed before the operation
    pub pre_count: usize,
    /// Records removed (or that would be removed, for a preview)
    pub removed_count: usize,
    pub remaining_count: usize,
    pub aborted: bool,
    pub abort_reason: Option<AbortReason>,
    /// Removal target after the percentage and minimum-count clamps
    pub clamped_target: usize,
    /// Number of records below the importance threshold
    pub candidate_count: usize,
    /// Ids removed (or selected, for a preview), lowest importance first
    pub removed_ids: Vec<MemoryId>,
    /// Mean importance of the removed records (0.0 when none)
    pub average_importance_removed: f32,
    /// Whether this result came from a non-mutating preview
    pub preview: bool,
}

impl PruneResult {
    pub(crate) fn abort(
        owner_id: &str,
        pre_count: usize,
        reason: AbortReason,
        clamped_target: usize,
        candidate_count: usize,
        preview: bool,
    ) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            pre_count,
            removed_count: 0,
            remaining_count: pre_count,
            aborted: true,
            abort_reason: Some(reason),
            clamped_target,
            candidate_count,
            removed_ids: Vec::new(),
            average_importance_removed: 0.0,
            preview,
        }
    }
}

/// Advice on whether an owner's memory set should be shrunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneRecommendation {
    pub owner_id: OwnerId,
    /// Whether the owner holds more records than the auto-prune threshold
    pub needs_pruning: bool,
    pub current_count: usize,
    /// Count a threshold-driven prune aims for
    pub target_count: usize,
    /// Records a threshold-driven prune would remove right now
    pub would_prune: usize,
    pub average_importance: f32,
    /// Lowest and highest importance among the records that would go
    pub importance_range: Option<(f32, f32)>,
    /// Set when the prune would refuse to run
    pub abort_reason: Option<AbortReason>,
}

impl PruneRecommendation {
    pub fn summary(&self) -> String {
        match (self.needs_pruning, self.abort_reason) {
            (false, _) => "No pruning needed".to_string(),
            (true, Some(reason)) => format!("Pruning needed but refused: {}", reason),
            (true, None) => format!(
                "Would prune {} memories with average importance {:.3}",
                self.would_prune, self.average_importance
            ),
        }
    }
}

/// Importance histogram with [`HISTOGRAM_BUCKETS`] equal-width buckets over `[0, 1]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportanceHistogram {
    pub buckets: [usize; HISTOGRAM_BUCKETS],
}

impl ImportanceHistogram {
    pub fn from_scores<I: IntoIterator<Item = f32>>(scores: I) -> Self {
        let mut histogram = Self::default();
        for score in scores {
            histogram.add(score);
        }
        histogram
    }

    pub fn add(&mut self, score: f32) {
        let clamped = score.clamp(0.0, 1.0);
        let idx = ((clamped * HISTOGRAM_BUCKETS as f32) as usize).min(HISTOGRAM_BUCKETS - 1);
        self.buckets[idx] += 1;
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().sum()
    }
}

/// Per-owner memory statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub owner_id: OwnerId,
    pub count: usize,
    pub importance_histogram: ImportanceHistogram,
    pub avg_importance: f32,
    pub min_importance: f32,
    pub max_importance: f32,
    /// Records below the configured prune threshold
    pub below_prune_threshold: usize,
}

/// Storage mode for SQLite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// WAL journal; fastest, for local disks
    #[default]
    Local,
    /// DELETE journal; single file, safe inside cloud-synced folders
    CloudSafe,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "wal" => Ok(StorageMode::Local),
            "cloud-safe" | "cloud_safe" | "delete" => Ok(StorageMode::CloudSafe),
            _ => Err(format!("Unknown storage mode: {}", s)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
}

impl StorageConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            storage_mode: StorageMode::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kind_roundtrip() {
        for kind in MemoryKind::ALL {
            let parsed: MemoryKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("dream".parse::<MemoryKind>().is_err());
        assert_eq!("  Secret ".parse::<MemoryKind>(), Ok(MemoryKind::Secret));
    }

    #[test]
    fn test_histogram_buckets() {
        let histogram = ImportanceHistogram::from_scores([0.0, 0.05, 0.15, 0.95, 1.0, 1.4]);
        assert_eq!(histogram.buckets[0], 2);
        assert_eq!(histogram.buckets[1], 1);
        assert_eq!(histogram.buckets[9], 3);
        assert_eq!(histogram.total(), 6);
    }

    #[test]
    fn test_abort_reason_strings() {
        assert_eq!(
            AbortReason::InsufficientCandidates.to_string(),
            "insufficient low-importance memories"
        );
        assert_eq!(
            AbortReason::BelowMinimumSafeCount.to_string(),
            "below minimum safe count"
        );
        let json = serde_json::to_string(&AbortReason::InsufficientCandidates).unwrap();
        assert_eq!(json, "\"insufficient_candidates\"");
    }

    #[test]
    fn test_record_serializes_kind() {
        let now = Utc::now();
        let record = MemoryRecord {
            id: 1,
            owner_id: "aria".to_string(),
            content_digest: ContentDigest::default(),
            memory_kind: MemoryKind::Trauma,
            importance: 0.9,
            created_at: now,
            last_decay_at: now,
            last_accessed_at: None,
            access_count: 0,
            visibility: Visibility::Shared,
            topic_drift_count: 0,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "trauma");
        assert_eq!(value["visibility"], "shared");
    }
}
