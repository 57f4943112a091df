//! Feature extraction from raw memory text
//!
//! Turns text plus a [`ScoringContext`] into five bounded signals used by the
//! [`ImportanceScorer`](super::ImportanceScorer). Extraction is heuristic and
//! never fails: malformed input yields conservative values.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::keywords::CompiledKeywords;
use crate::types::{ContentDigest, SNIPPET_MAX_CHARS};

/// Topic alignment when no preferred topic appears in the text
pub const NEUTRAL_TOPIC_ALIGNMENT: f32 = 0.5;

/// Word count at which the length term of engagement reaches ~63% of its cap
const ENGAGEMENT_LENGTH_SCALE: f32 = 20.0;

/// Optional hints about the conversation a memory came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringContext {
    /// Owner's topic preferences, 0-100
    #[serde(default)]
    pub topic_preferences: HashMap<String, f32>,
    /// Affinity between the participants, -1.0 (hostile) to 1.0 (close)
    pub affinity: Option<f32>,
    /// Declared topic of the conversation
    pub topic: Option<String>,
}

impl ScoringContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preference(mut self, topic: impl Into<String>, preference: f32) -> Self {
        self.topic_preferences.insert(topic.into(), preference);
        self
    }

    pub fn with_affinity(mut self, affinity: f32) -> Self {
        self.affinity = Some(affinity);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Extracted signals, each in `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub emotional_intensity: f32,
    pub context_significance: f32,
    pub topic_alignment: f32,
    pub engagement: f32,
    pub relationship_factor: f32,
}

impl FeatureVector {
    /// Features of an empty text
    pub fn empty() -> Self {
        Self {
            emotional_intensity: 0.0,
            context_significance: 0.0,
            topic_alignment: NEUTRAL_TOPIC_ALIGNMENT,
            engagement: 0.0,
            relationship_factor: 0.0,
        }
    }
}

/// Extracts [`FeatureVector`]s and [`ContentDigest`]s from text
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    keywords: Arc<CompiledKeywords>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(CompiledKeywords::builtin())
    }
}

/// Surface statistics shared by the feature and digest paths
struct TextStats {
    words: usize,
    exclamations: usize,
    questions: usize,
    caps_ratio: f32,
}

impl TextStats {
    fn of(text: &str) -> Self {
        let mut upper = 0usize;
        let mut alphabetic = 0usize;
        let mut exclamations = 0usize;
        let mut questions = 0usize;
        for c in text.chars() {
            if c.is_alphabetic() {
                alphabetic += 1;
                if c.is_uppercase() {
                    upper += 1;
                }
            } else if c == '!' {
                exclamations += 1;
            } else if c == '?' {
                questions += 1;
            }
        }
        Self {
            words: text.split_whitespace().count(),
            exclamations,
            questions,
            caps_ratio: if alphabetic == 0 {
                0.0
            } else {
                upper as f32 / alphabetic as f32
            },
        }
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl FeatureExtractor {
    pub fn new(keywords: Arc<CompiledKeywords>) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &CompiledKeywords {
        &self.keywords
    }

    /// Compute all five features
    pub fn extract(&self, text: &str, context: &ScoringContext) -> FeatureVector {
        if text.trim().is_empty() {
            return FeatureVector::empty();
        }
        let stats = TextStats::of(text);
        let lowered = text.to_lowercase();

        FeatureVector {
            emotional_intensity: self.emotional_intensity(text, &stats),
            context_significance: self.context_significance(text, context),
            topic_alignment: topic_alignment(&lowered, context),
            engagement: self.engagement(text, &stats),
            relationship_factor: relationship_factor(context.affinity),
        }
    }

    /// Keyword half plus punctuation half (exclamations and capitals)
    fn emotional_intensity(&self, text: &str, stats: &TextStats) -> f32 {
        let keyword = 0.5
            * tokens(text)
                .filter_map(|t| self.keywords.emotion_weight(&t))
                .fold(0.0f32, f32::max);

        let exclamation = 0.5 * (stats.exclamations as f32 / 3.0).min(1.0);
        let caps = 0.5 * ((stats.caps_ratio - 0.1) / 0.2).clamp(0.0, 1.0);

        (keyword + exclamation + caps).clamp(0.0, 1.0)
    }

    fn context_significance(&self, text: &str, context: &ScoringContext) -> f32 {
        let (mut score, _) = self.keywords.significance(text);
        if let Some(hint) = context
            .topic
            .as_deref()
            .and_then(|topic| self.keywords.topic_hint_weight(topic))
        {
            score = score.max(hint);
        }
        score.clamp(0.0, 1.0)
    }

    fn engagement(&self, text: &str, stats: &TextStats) -> f32 {
        let length = 0.5 * (1.0 - (-(stats.words as f32) / ENGAGEMENT_LENGTH_SCALE).exp());
        let questions = (0.15 * stats.questions as f32).min(0.3);
        let interrogatives = (0.1 * self.keywords.interrogative_count(text) as f32).min(0.2);
        let exclamations = (0.05 * stats.exclamations as f32).min(0.15);

        (length + questions + interrogatives + exclamations).clamp(0.0, 1.0)
    }

    /// Summarize text into the digest stored alongside a memory
    pub fn digest(&self, text: &str, context: &ScoringContext) -> ContentDigest {
        let stats = TextStats::of(text);
        let lowered = text.to_lowercase();

        // BTreeSet keeps the keyword list deduplicated and deterministic
        let mut keywords: BTreeSet<String> = tokens(text)
            .filter(|t| self.keywords.emotion_weight(t).is_some())
            .collect();
        keywords.extend(self.keywords.significance(text).1);
        keywords.extend(
            context
                .topic_preferences
                .keys()
                .map(|topic| topic.to_lowercase())
                .filter(|topic| !topic.is_empty() && lowered.contains(topic.as_str())),
        );

        let trimmed = text.trim();
        let snippet = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(SNIPPET_MAX_CHARS).collect())
        };

        ContentDigest {
            text_length: text.chars().count(),
            keywords: keywords.into_iter().collect(),
            exclamation_count: stats.exclamations,
            caps_ratio: stats.caps_ratio,
            snippet,
        }
    }
}

/// Strongest preference among the topics mentioned in the text
fn topic_alignment(lowered: &str, context: &ScoringContext) -> f32 {
    let best = context
        .topic_preferences
        .iter()
        .filter(|(topic, _)| {
            let topic = topic.trim().to_lowercase();
            !topic.is_empty() && lowered.contains(topic.as_str())
        })
        .map(|(_, preference)| {
            if preference.is_finite() {
                (preference / 100.0).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .fold(None, |best: Option<f32>, p| Some(best.map_or(p, |b| b.max(p))));

    best.unwrap_or(NEUTRAL_TOPIC_ALIGNMENT)
}

/// U-shaped: strong feelings either way matter, neutrality does not
fn relationship_factor(affinity: Option<f32>) -> f32 {
    match affinity {
        Some(a) if a.is_finite() => {
            let a = a.clamp(-1.0, 1.0);
            a * a
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::default()
    }

    #[test]
    fn test_emergency_dragon_features() {
        let features = extractor().extract(
            "EMERGENCY! There's a dragon attacking!",
            &ScoringContext::default(),
        );
        assert!((features.emotional_intensity - 0.8333).abs() < 0.01);
        assert_eq!(features.context_significance, 0.9);
        assert_eq!(features.topic_alignment, 0.5);
        assert!((features.engagement - 0.21).abs() < 0.02);
        assert_eq!(features.relationship_factor, 0.0);
    }

    #[test]
    fn test_empty_text() {
        let ctx = ScoringContext::default()
            .with_affinity(1.0)
            .with_topic("crisis");
        assert_eq!(extractor().extract("", &ctx), FeatureVector::empty());
        assert_eq!(extractor().extract("   \n\t", &ctx), FeatureVector::empty());
    }

    #[test]
    fn test_emotion_keyword_is_whole_word() {
        let ex = extractor();
        let calm = ScoringContext::default();
        assert_eq!(ex.extract("i am furious", &calm).emotional_intensity, 0.475);
        // "contentious" is not "content"
        assert_eq!(ex.extract("a contentious topic", &calm).emotional_intensity, 0.0);
    }

    #[test]
    fn test_keyword_and_punctuation_each_give_half() {
        let ex = extractor();
        let calm = ScoringContext::default();
        let quiet = ex.extract("i feel devastated", &calm).emotional_intensity;
        assert!((quiet - 0.45).abs() < 1e-6);
        let shouted = ex.extract("DEVASTATED!!!", &calm).emotional_intensity;
        assert_eq!(shouted, 1.0);
        let punctuation_only = ex.extract("WHAT!!!", &calm).emotional_intensity;
        assert!(punctuation_only <= 1.0 && punctuation_only > 0.5);
    }

    #[test]
    fn test_topic_alignment_uses_strongest_preference() {
        let ctx = ScoringContext::default()
            .with_preference("Magic", 90.0)
            .with_preference("trade", 40.0)
            .with_preference("cooking", 100.0);
        let features = extractor().extract("magic is good for trade", &ctx);
        assert!((features.topic_alignment - 0.9).abs() < 1e-6);

        let features = extractor().extract("nothing relevant", &ctx);
        assert_eq!(features.topic_alignment, NEUTRAL_TOPIC_ALIGNMENT);
    }

    #[test]
    fn test_topic_hint_raises_context() {
        let ex = extractor();
        let plain = ex.extract("we talked for a while", &ScoringContext::default());
        assert_eq!(plain.context_significance, 0.0);

        let hinted = ex.extract(
            "we talked for a while",
            &ScoringContext::default().with_topic("Secret"),
        );
        assert_eq!(hinted.context_significance, 0.8);
    }

    #[test]
    fn test_relationship_is_u_shaped() {
        assert_eq!(relationship_factor(None), 0.0);
        assert_eq!(relationship_factor(Some(0.0)), 0.0);
        assert_eq!(relationship_factor(Some(1.0)), 1.0);
        assert_eq!(relationship_factor(Some(-1.0)), 1.0);
        assert!((relationship_factor(Some(0.5)) - 0.25).abs() < 1e-6);
        assert_eq!(relationship_factor(Some(7.0)), 1.0);
        assert_eq!(relationship_factor(Some(f32::NAN)), 0.0);
    }

    #[test]
    fn test_engagement_rewards_questions() {
        let ex = extractor();
        let ctx = ScoringContext::default();
        let statement = ex.extract("the tavern opens at dawn", &ctx).engagement;
        let question = ex.extract("why does the tavern open at dawn?", &ctx).engagement;
        assert!(question > statement);
        assert!(question <= 1.0);
    }

    #[test]
    fn test_digest() {
        let ctx = ScoringContext::default().with_preference("dragon", 80.0);
        let digest = extractor().digest("I was terrified! The DRAGON kept its secret.", &ctx);
        assert_eq!(digest.exclamation_count, 1);
        assert!(digest.keywords.contains(&"terrified".to_string()));
        assert!(digest.keywords.contains(&"secret".to_string()));
        assert!(digest.keywords.contains(&"dragon".to_string()));
        assert!(digest.caps_ratio > 0.0);
        assert_eq!(digest.text_length, 44);

        let long = "x".repeat(200);
        let digest = extractor().digest(&long, &ScoringContext::default());
        assert_eq!(digest.snippet.unwrap().chars().count(), SNIPPET_MAX_CHARS);
        assert_eq!(digest.text_length, 200);
    }
}
