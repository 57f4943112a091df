//! Retention - memory relevance and retention engine
//!
//! Scores conversational memories by importance, ages those scores over
//! time, and evicts low-relevance memories without ever shrinking an owner's
//! memory set below safe limits.

pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod intelligence;
pub mod pruning;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::{ConfigHandle, DecayMode, RetentionConfig};
pub use engine::{RetentionEngine, StartOutcome};
pub use error::{Result, RetentionError};
pub use intelligence::{FeatureExtractor, FeatureVector, ImportanceScorer, ScoringContext};
pub use storage::{MemoryStore, SqliteBackend, Storage};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
