//! Importance scoring
//!
//! Combines a [`FeatureVector`] into a single importance score:
//!
//! ```text
//! raw    = 0.5 + w_e*E + w_c*C + w_t*T + w_g*G + w_r*R
//! fresh  = clamp(raw, 0.5, 0.8)
//! score  = clamp(fresh * kind_multiplier, 0.1, 1.0)
//! ```
//!
//! Fresh memories never start above 0.8 on text alone; only the kind
//! multiplier (secrets, trauma) can push the stored value higher.

use serde::{Deserialize, Serialize};

use super::features::FeatureVector;
use crate::config::{ImportanceWeights, KindMultipliers, RetentionConfig};
use crate::types::MemoryKind;

/// Starting point before any feature contributes
pub const BASE_IMPORTANCE: f32 = 0.5;
/// Lower bound of a freshly computed score
pub const FRESH_MIN: f32 = 0.5;
/// Upper bound of a freshly computed score
pub const FRESH_MAX: f32 = 0.8;
/// Bounds of the stored score after the kind multiplier
pub const SCORE_MIN: f32 = 0.1;
pub const SCORE_MAX: f32 = 1.0;

/// Pure, deterministic importance scorer
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    weights: ImportanceWeights,
    multipliers: KindMultipliers,
}

/// Per-factor view of a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceBreakdown {
    pub kind: MemoryKind,
    pub features: FeatureVector,
    /// Weighted contribution of each feature
    pub emotional: f32,
    pub context: f32,
    pub topic: f32,
    pub engagement: f32,
    pub relationship: f32,
    pub raw: f32,
    pub clamped: f32,
    pub multiplier: f32,
    pub score: f32,
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ImportanceScorer {
    pub fn new(weights: ImportanceWeights, multipliers: KindMultipliers) -> Self {
        Self {
            weights,
            multipliers,
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(
            config.importance_weights.clone(),
            config.memory_kind_multipliers.clone(),
        )
    }

    /// Final importance in `[0.1, 1.0]`
    pub fn score(&self, features: &FeatureVector, kind: MemoryKind) -> f32 {
        self.breakdown(features, kind).score
    }

    pub fn breakdown(&self, features: &FeatureVector, kind: MemoryKind) -> ImportanceBreakdown {
        let w = &self.weights;
        let emotional = w.emotional * unit(features.emotional_intensity);
        let context = w.context * unit(features.context_significance);
        let topic = w.topic * unit(features.topic_alignment);
        let engagement = w.engagement * unit(features.engagement);
        let relationship = w.relationship * unit(features.relationship_factor);

        let raw = BASE_IMPORTANCE + emotional + context + topic + engagement + relationship;
        let clamped = raw.clamp(FRESH_MIN, FRESH_MAX);
        let multiplier = self.multipliers.get(kind);
        let score = (clamped * multiplier).clamp(SCORE_MIN, SCORE_MAX);

        ImportanceBreakdown {
            kind,
            features: *features,
            emotional,
            context,
            topic,
            engagement,
            relationship,
            raw,
            clamped,
            multiplier,
            score,
        }
    }
}

impl ImportanceBreakdown {
    /// Qualitative label for the final score
    pub fn tier(&self) -> &'static str {
        match self.score {
            s if s >= 0.9 => "extremely important",
            s if s >= 0.7 => "high importance",
            s if s >= 0.5 => "moderate importance",
            s if s >= 0.3 => "low importance",
            _ => "minimal importance",
        }
    }

    /// Human-readable summary listing the factors that contributed
    pub fn explain(&self) -> String {
        let mut factors = Vec::new();
        if self.features.emotional_intensity > 0.5 {
            factors.push(format!(
                "high emotional content ({:.2})",
                self.features.emotional_intensity
            ));
        }
        if self.features.context_significance > 0.5 {
            factors.push(format!(
                "significant context ({:.2})",
                self.features.context_significance
            ));
        }
        if self.features.topic_alignment > 0.6 {
            factors.push(format!(
                "aligned with interests ({:.2})",
                self.features.topic_alignment
            ));
        }
        if self.features.engagement > 0.5 {
            factors.push(format!("high engagement ({:.2})", self.features.engagement));
        }
        if self.features.relationship_factor > 0.5 {
            factors.push(format!(
                "strong relationship ({:.2})",
                self.features.relationship_factor
            ));
        }
        if (self.multiplier - 1.0).abs() > f32::EPSILON {
            factors.push(format!("{} multiplier x{:.2}", self.kind, self.multiplier));
        }

        let mut summary = format!("{:.2}: {}", self.score, self.tier());
        if !factors.is_empty() {
            summary.push_str(" (");
            summary.push_str(&factors.join(", "));
            summary.push(')');
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(e: f32, c: f32, t: f32, g: f32, r: f32) -> FeatureVector {
        FeatureVector {
            emotional_intensity: e,
            context_significance: c,
            topic_alignment: t,
            engagement: g,
            relationship_factor: r,
        }
    }

    #[test]
    fn test_fresh_score_capped_at_point_eight() {
        let scorer = ImportanceScorer::default();
        let f = features(0.8, 0.9, 0.5, 0.2, 0.0);
        let breakdown = scorer.breakdown(&f, MemoryKind::Conversation);
        assert!((breakdown.raw - 0.975).abs() < 1e-5);
        assert_eq!(breakdown.clamped, 0.8);
        assert_eq!(breakdown.score, 0.8);
    }

    #[test]
    fn test_multiplier_applied_after_clamp() {
        let scorer = ImportanceScorer::default();
        let f = features(1.0, 1.0, 1.0, 1.0, 1.0);
        // 0.8 * 1.5 = 1.2 -> capped at 1.0
        assert_eq!(scorer.score(&f, MemoryKind::Secret), 1.0);
        // 0.8 * 0.6
        assert!((scorer.score(&f, MemoryKind::Routine) - 0.48).abs() < 1e-6);

        let quiet = features(0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(scorer.score(&quiet, MemoryKind::Conversation), 0.5);
        assert!((scorer.score(&quiet, MemoryKind::Routine) - 0.3).abs() < 1e-6);
        assert!((scorer.score(&quiet, MemoryKind::Trauma) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_custom_multiplier_floor() {
        let multipliers = KindMultipliers {
            routine: 0.01,
            ..Default::default()
        };
        let scorer = ImportanceScorer::new(ImportanceWeights::default(), multipliers);
        let quiet = features(0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(scorer.score(&quiet, MemoryKind::Routine), SCORE_MIN);
    }

    #[test]
    fn test_non_finite_features_are_ignored() {
        let scorer = ImportanceScorer::default();
        let f = features(f32::NAN, f32::INFINITY, 0.5, -3.0, 0.0);
        let score = scorer.score(&f, MemoryKind::Conversation);
        assert!((0.5..=0.8).contains(&score));
    }

    #[test]
    fn test_explain_tiers() {
        let scorer = ImportanceScorer::default();
        let loud = scorer.breakdown(&features(1.0, 1.0, 1.0, 1.0, 1.0), MemoryKind::Trauma);
        let text = loud.explain();
        assert!(text.starts_with("1.00: extremely important"));
        assert!(text.contains("trauma multiplier"));

        let quiet = scorer.breakdown(&features(0.0, 0.0, 0.5, 0.0, 0.0), MemoryKind::Fact);
        assert_eq!(quiet.tier(), "moderate importance");
        assert!(!quiet.explain().contains('('));

        let routine = scorer.breakdown(&features(0.0, 0.0, 0.0, 0.0, 0.0), MemoryKind::Routine);
        assert_eq!(routine.tier(), "low importance");
    }
}
