//! Time-based importance decay
//!
//! - Pure decay curves (linear, exponential, logarithmic, step)
//! - Background scheduler with per-owner atomic batches and auto-pruning

pub mod functions;
pub mod scheduler;

pub use functions::{decay, scale};
pub use scheduler::{DecayHandle, DecayRunner, DecayScheduler};
