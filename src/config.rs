//! Engine configuration with validation and hot reload
//!
//! Configuration is loaded from TOML (every field optional, falling back to
//! defaults) and published through a [`ConfigHandle`]. Readers take a fresh
//! snapshot per operation, so a reload takes effect on the next scoring call,
//! prune or decay tick without restarting the scheduler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Result, RetentionError};
use crate::types::MemoryKind;

/// Upper bound for second-valued windows (about 100 years)
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 86_400;

/// Decay curve applied by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecayMode {
    Linear,
    #[default]
    Exponential,
    Logarithmic,
    Step,
    /// Decay disabled; scores are left untouched
    None,
}

impl DecayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayMode::Linear => "linear",
            DecayMode::Exponential => "exponential",
            DecayMode::Logarithmic => "logarithmic",
            DecayMode::Step => "step",
            DecayMode::None => "none",
        }
    }
}

impl std::fmt::Display for DecayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(DecayMode::Linear),
            "exponential" => Ok(DecayMode::Exponential),
            "logarithmic" => Ok(DecayMode::Logarithmic),
            "step" => Ok(DecayMode::Step),
            "none" => Ok(DecayMode::None),
            _ => Err(format!("Unknown decay mode: {}", s)),
        }
    }
}

/// Weights of the importance formula's feature terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceWeights {
    pub emotional: f32,
    pub context: f32,
    pub topic: f32,
    pub engagement: f32,
    pub relationship: f32,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            emotional: 0.25,
            context: 0.20,
            topic: 0.15,
            engagement: 0.10,
            relationship: 0.10,
        }
    }
}

impl ImportanceWeights {
    fn iter(&self) -> [(&'static str, f32); 5] {
        [
            ("emotional", self.emotional),
            ("context", self.context),
            ("topic", self.topic),
            ("engagement", self.engagement),
            ("relationship", self.relationship),
        ]
    }
}

/// Retention multiplier per memory kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindMultipliers {
    pub conversation: f32,
    pub preference: f32,
    pub fact: f32,
    pub secret: f32,
    pub trauma: f32,
    pub routine: f32,
    pub observation: f32,
}

impl Default for KindMultipliers {
    fn default() -> Self {
        Self {
            conversation: 1.0,
            preference: 1.0,
            fact: 1.0,
            secret: 1.5,
            trauma: 1.6,
            routine: 0.6,
            observation: 1.0,
        }
    }
}

impl KindMultipliers {
    pub fn get(&self, kind: MemoryKind) -> f32 {
        match kind {
            MemoryKind::Conversation => self.conversation,
            MemoryKind::Preference => self.preference,
            MemoryKind::Fact => self.fact,
            MemoryKind::Secret => self.secret,
            MemoryKind::Trauma => self.trauma,
            MemoryKind::Routine => self.routine,
            MemoryKind::Observation => self.observation,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    // Decay
    pub decay_enabled: bool,
    pub decay_mode: DecayMode,
    /// Importance lost per time unit (meaning depends on the mode)
    pub decay_rate: f32,
    /// Scheduler tick interval in milliseconds
    pub decay_interval_ms: u64,
    /// Length of one elapsed-time unit in seconds (86400 = rates are per day)
    pub decay_time_unit_secs: f64,
    /// Step width for [`DecayMode::Step`], in time units
    pub decay_step_size: f64,
    /// A record is only re-decayed once this long has passed since its last decay
    pub min_decay_gap_secs: u64,
    /// Floor below which decay never pushes a score
    pub decay_min_importance: f32,
    /// Records at or above this importance are never decayed
    pub protected_importance: Option<f32>,
    /// Records accessed within this window are not decayed (0 = disabled)
    pub access_protection_secs: u64,
    /// Scale each record's rate by how often it has been read
    pub access_based_decay: bool,
    /// Rate multiplier for never-accessed records when access-based
    pub zero_access_decay_multiplier: f32,
    /// Records read at least this often decay at half rate when access-based
    pub high_access_threshold: i64,
    /// Owners handled per tick, least recently decayed first (None = all)
    pub max_owners_per_cycle: Option<usize>,
    /// Owner batches run concurrently up to this limit
    pub max_concurrent_owners: usize,

    // Pruning
    pub min_safe_count: usize,
    pub max_prune_percent: f32,
    pub prune_importance_threshold: f32,
    pub enable_auto_pruning: bool,
    pub auto_prune_threshold: usize,

    // Scoring
    pub importance_weights: ImportanceWeights,
    pub memory_kind_multipliers: KindMultipliers,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            decay_enabled: true,
            decay_mode: DecayMode::Exponential,
            decay_rate: 0.1,
            decay_interval_ms: 6 * 60 * 60 * 1000,
            decay_time_unit_secs: 86_400.0,
            decay_step_size: 1.0,
            min_decay_gap_secs: 3600,
            decay_min_importance: 0.1,
            protected_importance: None,
            access_protection_secs: 0,
            access_based_decay: false,
            zero_access_decay_multiplier: 2.0,
            high_access_threshold: 3,
            max_owners_per_cycle: None,
            max_concurrent_owners: 4,
            min_safe_count: 10,
            max_prune_percent: 0.25,
            prune_importance_threshold: 0.6,
            enable_auto_pruning: true,
            auto_prune_threshold: 1000,
            importance_weights: ImportanceWeights::default(),
            memory_kind_multipliers: KindMultipliers::default(),
        }
    }
}

impl RetentionConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RetentionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms)
    }

    pub fn min_decay_gap(&self) -> Result<chrono::Duration> {
        window("min_decay_gap_secs", self.min_decay_gap_secs)
    }

    pub fn access_protection_window(&self) -> Result<chrono::Duration> {
        window("access_protection_secs", self.access_protection_secs)
    }

    /// Per-record rate, adjusted by access count when access-based decay is on
    pub fn decay_rate_for(&self, access_count: i64) -> f32 {
        if !self.access_based_decay {
            self.decay_rate
        } else if access_count == 0 {
            self.decay_rate * self.zero_access_decay_multiplier
        } else if access_count >= self.high_access_threshold {
            self.decay_rate * 0.5
        } else {
            self.decay_rate
        }
    }

    /// Effective mode, taking `decay_enabled` into account
    pub fn effective_decay_mode(&self) -> DecayMode {
        if self.decay_enabled {
            self.decay_mode
        } else {
            DecayMode::None
        }
    }

    /// Count an owner is pruned down to once it crosses `auto_prune_threshold`
    pub fn auto_prune_target_count(&self) -> usize {
        (self.auto_prune_threshold as f64 * (1.0 - self.max_prune_percent as f64)).floor() as usize
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(RetentionError::Validation(msg))
        }

        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return invalid(format!(
                "decay_rate must be a non-negative number, got {}",
                self.decay_rate
            ));
        }
        for (name, secs) in [
            ("min_decay_gap_secs", self.min_decay_gap_secs),
            ("access_protection_secs", self.access_protection_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return invalid(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_WINDOW_SECS, secs
                ));
            }
        }
        let zero_access = self.zero_access_decay_multiplier;
        if !zero_access.is_finite() || zero_access <= 0.0 {
            return invalid(format!(
                "zero_access_decay_multiplier must be positive, got {}",
                zero_access
            ));
        }
        if self.high_access_threshold < 1 {
            return invalid(format!(
                "high_access_threshold must be at least 1, got {}",
                self.high_access_threshold
            ));
        }
        if self.decay_interval_ms == 0 {
            return invalid("decay_interval_ms must be greater than 0".to_string());
        }
        if !self.decay_time_unit_secs.is_finite() || self.decay_time_unit_secs <= 0.0 {
            return invalid(format!(
                "decay_time_unit_secs must be positive, got {}",
                self.decay_time_unit_secs
            ));
        }
        if !self.decay_step_size.is_finite() || self.decay_step_size <= 0.0 {
            return invalid(format!(
                "decay_step_size must be positive, got {}",
                self.decay_step_size
            ));
        }
        if !(0.0..1.0).contains(&self.decay_min_importance) {
            return invalid(format!(
                "decay_min_importance must be in [0.0, 1.0), got {}",
                self.decay_min_importance
            ));
        }
        if let Some(protected) = self.protected_importance {
            if !(protected > self.decay_min_importance && protected <= 1.0) {
                return invalid(format!(
                    "protected_importance must be in (decay_min_importance, 1.0], got {}",
                    protected
                ));
            }
        }
        if self.max_owners_per_cycle == Some(0) {
            return invalid("max_owners_per_cycle must be at least 1".to_string());
        }
        if self.max_concurrent_owners == 0 {
            return invalid("max_concurrent_owners must be at least 1".to_string());
        }
        if !(self.max_prune_percent > 0.0 && self.max_prune_percent <= 1.0) {
            return invalid(format!(
                "max_prune_percent must be in (0.0, 1.0], got {}",
                self.max_prune_percent
            ));
        }
        if !(0.0..=1.0).contains(&self.prune_importance_threshold) {
            return invalid(format!(
                "prune_importance_threshold must be in [0.0, 1.0], got {}",
                self.prune_importance_threshold
            ));
        }
        if self.auto_prune_threshold == 0 {
            return invalid("auto_prune_threshold must be greater than 0".to_string());
        }
        for (name, weight) in self.importance_weights.iter() {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return invalid(format!(
                    "importance weight '{}' must be in [0.0, 1.0], got {}",
                    name, weight
                ));
            }
        }
        for kind in MemoryKind::ALL {
            let multiplier = self.memory_kind_multipliers.get(kind);
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return invalid(format!(
                    "multiplier for '{}' must be positive, got {}",
                    kind, multiplier
                ));
            }
        }
        Ok(())
    }
}

fn window(name: &str, secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| RetentionError::Validation(format!("{} out of range: {}", name, secs)))
}

/// Shared, hot-reloadable configuration
///
/// Cloning the handle shares the underlying channel. Subscribers are woken
/// on every successful reload.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<RetentionConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: RetentionConfig) -> Result<Self> {
        config.validate()?;
        let (tx, _rx) = watch::channel(Arc::new(config));
        Ok(Self { tx: Arc::new(tx) })
    }

    /// Snapshot of the current configuration
    pub fn current(&self) -> Arc<RetentionConfig> {
        self.tx.borrow().clone()
    }

    /// Validate and publish a new configuration. Invalid configs are
    /// rejected and the previous one stays active.
    pub fn reload(&self, config: RetentionConfig) -> Result<()> {
        config.validate()?;
        tracing::info!(
            mode = %config.effective_decay_mode(),
            interval_ms = config.decay_interval_ms,
            "Retention config reloaded"
        );
        self.tx.send_replace(Arc::new(config));
        Ok(())
    }

    /// Apply an in-place edit to a copy of the current config, then reload it
    pub fn update<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut RetentionConfig),
    {
        let mut next = (*self.current()).clone();
        edit(&mut next);
        self.reload(next)
    }

    /// Receiver notified whenever the config changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<RetentionConfig>> {
        self.tx.subscribe()
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(RetentionConfig::default()));
        Self { tx: Arc::new(tx) }
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("current", &self.current())
            .finish()
    }
}
