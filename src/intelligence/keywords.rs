//! Versioned keyword tables for feature extraction
//!
//! The built-in tables are compiled once on first use. Callers can supply
//! their own tables (for example deserialized from TOML or JSON) and compile
//! them into a [`CompiledKeywords`] for a custom
//! [`FeatureExtractor`](super::FeatureExtractor).

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetentionError};

/// A literal term with its weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f32,
}

/// A regex pattern with its weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPattern {
    pub pattern: String,
    pub weight: f32,
}

fn term(term: &str, weight: f32) -> WeightedTerm {
    WeightedTerm {
        term: term.to_string(),
        weight,
    }
}

fn pattern(pattern: &str, weight: f32) -> WeightedPattern {
    WeightedPattern {
        pattern: pattern.to_string(),
        weight,
    }
}

/// Raw, serializable keyword tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTables {
    pub version: u32,
    /// Emotion words matched against whole lowercase tokens
    pub emotions: Vec<WeightedTerm>,
    /// Case-insensitive significance patterns, highest tier first
    pub significance: Vec<WeightedPattern>,
    /// Information-seeking words and phrases
    pub interrogatives: Vec<String>,
    /// Conversation topic hints that raise context significance
    pub topic_hints: Vec<WeightedTerm>,
}

impl KeywordTables {
    pub const VERSION: u32 = 1;

    /// Validate weights and compile every pattern
    pub fn compile(&self) -> Result<CompiledKeywords> {
        let check = |what: &str, name: &str, weight: f32| -> Result<()> {
            if weight.is_finite() && (0.0..=1.0).contains(&weight) {
                Ok(())
            } else {
                Err(RetentionError::Config(format!(
                    "{} '{}' has weight {} outside [0.0, 1.0]",
                    what, name, weight
                )))
            }
        };

        let mut emotions = HashMap::with_capacity(self.emotions.len());
        for entry in &self.emotions {
            check("emotion keyword", &entry.term, entry.weight)?;
            emotions.insert(entry.term.to_lowercase(), entry.weight);
        }

        let mut significance = Vec::with_capacity(self.significance.len());
        for entry in &self.significance {
            check("significance pattern", &entry.pattern, entry.weight)?;
            let regex = Regex::new(&format!(r"(?i)\b(?:{})\b", entry.pattern)).map_err(|e| {
                RetentionError::Config(format!("invalid pattern '{}': {}", entry.pattern, e))
            })?;
            significance.push((regex, entry.weight));
        }

        let interrogatives = if self.interrogatives.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = self
                .interrogatives
                .iter()
                .map(|phrase| regex::escape(&phrase.to_lowercase()))
                .collect();
            let regex = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
                .map_err(|e| RetentionError::Config(format!("invalid interrogatives: {}", e)))?;
            Some(regex)
        };

        let mut topic_hints = HashMap::with_capacity(self.topic_hints.len());
        for entry in &self.topic_hints {
            check("topic hint", &entry.term, entry.weight)?;
            topic_hints.insert(entry.term.to_lowercase(), entry.weight);
        }

        Ok(CompiledKeywords {
            version: self.version,
            emotions,
            significance,
            interrogatives,
            topic_hints,
        })
    }
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            emotions: vec![
                // High intensity
                term("furious", 0.95),
                term("love", 0.9),
                term("hate", 0.9),
                term("ecstatic", 0.9),
                term("devastated", 0.9),
                term("terrified", 0.9),
                term("enraged", 0.9),
                term("heartbroken", 0.9),
                term("thrilled", 0.85),
                term("overjoyed", 0.85),
                // Medium intensity
                term("angry", 0.7),
                term("excited", 0.7),
                term("anxious", 0.7),
                term("proud", 0.7),
                term("surprised", 0.65),
                term("embarrassed", 0.65),
                term("happy", 0.6),
                term("sad", 0.6),
                term("worried", 0.6),
                term("disappointed", 0.6),
                // Low intensity
                term("interested", 0.5),
                term("content", 0.4),
                term("curious", 0.4),
                term("confused", 0.4),
                term("amused", 0.4),
                term("tired", 0.3),
                term("bored", 0.2),
            ],
            significance: vec![
                pattern("emergency|urgent|crisis|death|died|born|married|divorced", 0.9),
                pattern("secret|confession|betrayal|revelation|discovered", 0.85),
                pattern("first time|never again|last chance|forever", 0.8),
                pattern("promise|swear|vow|commitment|decision", 0.8),
                pattern("important|significant|critical|serious|major", 0.7),
                pattern("fight|argument|conflict|disagreement", 0.65),
                pattern("family|friend|enemy|ally|relationship", 0.6),
                pattern("business|trade|profit|loss|money", 0.55),
                pattern("interesting|unusual|strange|weird|funny", 0.5),
                pattern("plan|idea|suggestion|proposal", 0.5),
                pattern("remember|forget|recall|remind", 0.45),
            ],
            interrogatives: [
                "how", "why", "what", "when", "where", "who", "tell me", "explain", "describe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            topic_hints: vec![
                term("crisis", 0.8),
                term("emergency", 0.8),
                term("important", 0.8),
                term("secret", 0.8),
                term("personal", 0.6),
                term("relationship", 0.6),
                term("family", 0.6),
            ],
        }
    }
}

/// Keyword tables ready for matching
#[derive(Debug, Clone)]
pub struct CompiledKeywords {
    version: u32,
    emotions: HashMap<String, f32>,
    significance: Vec<(Regex, f32)>,
    interrogatives: Option<Regex>,
    topic_hints: HashMap<String, f32>,
}

static BUILTIN: Lazy<Arc<CompiledKeywords>> = Lazy::new(|| {
    Arc::new(
        KeywordTables::default()
            .compile()
            .expect("built-in keyword tables compile"),
    )
});

impl CompiledKeywords {
    /// Shared instance of the built-in tables
    pub fn builtin() -> Arc<CompiledKeywords> {
        BUILTIN.clone()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Weight of an emotion token, if it is one
    pub fn emotion_weight(&self, token: &str) -> Option<f32> {
        self.emotions.get(token).copied()
    }

    /// Highest significance tier matched by the text, with the matched words
    pub fn significance(&self, text: &str) -> (f32, Vec<String>) {
        let mut best = 0.0f32;
        let mut matched = Vec::new();
        for (regex, weight) in &self.significance {
            let mut hit = false;
            for m in regex.find_iter(text) {
                hit = true;
                matched.push(m.as_str().to_lowercase());
            }
            if hit {
                best = best.max(*weight);
            }
        }
        (best, matched)
    }

    /// Number of interrogative words and phrases in the text
    pub fn interrogative_count(&self, text: &str) -> usize {
        self.interrogatives
            .as_ref()
            .map(|regex| regex.find_iter(text).count())
            .unwrap_or(0)
    }

    /// Weight of a conversation topic hint
    pub fn topic_hint_weight(&self, topic: &str) -> Option<f32> {
        self.topic_hints.get(&topic.trim().to_lowercase()).copied()
    }
}
