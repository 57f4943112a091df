//! Memory intelligence: feature extraction and importance scoring
//!
//! Provides:
//! - Versioned, swappable keyword tables
//! - Feature extraction (emotion, significance, topic, engagement, relationship)
//! - Importance scoring with per-factor breakdowns

pub mod features;
pub mod importance;
pub mod keywords;

pub use features::{FeatureExtractor, FeatureVector, ScoringContext, NEUTRAL_TOPIC_ALIGNMENT};
pub use importance::{ImportanceBreakdown, ImportanceScorer};
pub use keywords::{CompiledKeywords, KeywordTables, WeightedPattern, WeightedTerm};
