//! Retention CLI
//!
//! Operator interface for scoring, inspecting, decaying and pruning memories.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retention::config::{DecayMode, RetentionConfig};
use retention::engine::RetentionEngine;
use retention::intelligence::ScoringContext;
use retention::types::*;

#[derive(Parser)]
#[command(name = "retention-cli")]
#[command(about = "Memory relevance and retention engine CLI")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(
        long,
        env = "RETENTION_DB_PATH",
        default_value = "~/.local/share/retention/memories.db"
    )]
    db_path: String,

    /// Storage mode: local (WAL) or cloud-safe
    #[arg(long, env = "RETENTION_STORAGE_MODE", default_value = "local")]
    storage_mode: String,

    /// TOML config file
    #[arg(long, env = "RETENTION_CONFIG")]
    config: Option<PathBuf>,

    /// Override the decay mode
    #[arg(long, env = "RETENTION_DECAY_MODE")]
    decay_mode: Option<String>,

    /// Override the scheduler interval in milliseconds
    #[arg(long, env = "RETENTION_DECAY_INTERVAL_MS")]
    decay_interval_ms: Option<u64>,

    /// Override the minimum records an owner keeps
    #[arg(long, env = "RETENTION_MIN_SAFE_COUNT")]
    min_safe_count: Option<usize>,

    /// Override the largest fraction removed by one prune
    #[arg(long, env = "RETENTION_MAX_PRUNE_PERCENT")]
    max_prune_percent: Option<f32>,

    /// Emit logs as JSON
    #[arg(long, env = "RETENTION_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score text without storing it
    Score {
        /// Text to score
        content: String,
        /// Memory kind
        #[arg(short, long, default_value = "conversation")]
        kind: String,
        #[command(flatten)]
        context: ContextArgs,
        /// Show the per-factor breakdown
        #[arg(short, long)]
        explain: bool,
    },
    /// Score and store a memory
    Store {
        /// Owner id
        owner: String,
        /// Text to remember
        content: String,
        #[arg(short, long, default_value = "conversation")]
        kind: String,
        #[arg(short, long, default_value = "private")]
        visibility: String,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Show an owner's memory statistics
    Stats {
        owner: String,
    },
    /// Show what a prune would remove
    Preview {
        owner: String,
        #[command(flatten)]
        prune: PruneArgs,
    },
    /// Remove an owner's least important memories
    Prune {
        owner: String,
        #[command(flatten)]
        prune: PruneArgs,
    },
    /// Check whether an owner has outgrown the auto-prune threshold
    Recommend {
        owner: String,
    },
    /// Run one decay cycle, or force-decay a single owner
    Decay {
        /// Only this owner, with --factor
        #[arg(long, requires = "factor")]
        owner: Option<String>,
        /// Fraction of importance to remove (0.1 = 10%)
        #[arg(long, requires = "owner")]
        factor: Option<f32>,
    },
    /// Run the background decay scheduler until interrupted
    Serve,
}

#[derive(clap::Args)]
struct ContextArgs {
    /// Declared conversation topic
    #[arg(long)]
    topic: Option<String>,
    /// Participant affinity, -1.0 to 1.0
    #[arg(long, allow_hyphen_values = true)]
    affinity: Option<f32>,
    /// Topic preferences as topic=score pairs (0-100), comma-separated
    #[arg(long)]
    prefs: Option<String>,
}

#[derive(clap::Args)]
struct PruneArgs {
    /// Number of memories to remove
    #[arg(short, long)]
    count: usize,
    /// Importance threshold for candidates
    #[arg(short, long)]
    threshold: Option<f32>,
    /// Remove what qualifies even if fewer than requested
    #[arg(short, long)]
    force: bool,
}

impl ContextArgs {
    fn into_context(self) -> anyhow::Result<ScoringContext> {
        let mut preferences = HashMap::new();
        if let Some(prefs) = self.prefs {
            for pair in prefs.split(',').filter(|p| !p.trim().is_empty()) {
                let (topic, score) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected topic=score, got '{}'", pair))?;
                let score: f32 = score
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid preference score in '{}'", pair))?;
                preferences.insert(topic.trim().to_string(), score);
            }
        }
        Ok(ScoringContext {
            topic_preferences: preferences,
            affinity: self.affinity,
            topic: self.topic,
        })
    }
}

impl PruneArgs {
    fn options(&self) -> PruneOptions {
        PruneOptions {
            target_removal_count: self.count,
            min_importance_threshold: self.threshold,
            force: self.force,
        }
    }
}

fn init_logging(json: bool) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RetentionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(&path.to_string_lossy()).to_string();
            RetentionConfig::load(&path).with_context(|| format!("loading config {}", path))?
        }
        None => RetentionConfig::default(),
    };

    if let Some(mode) = &cli.decay_mode {
        config.decay_mode = mode.parse::<DecayMode>().map_err(|e| anyhow!(e))?;
    }
    if let Some(interval) = cli.decay_interval_ms {
        config.decay_interval_ms = interval;
    }
    if let Some(min_safe) = cli.min_safe_count {
        config.min_safe_count = min_safe;
    }
    if let Some(percent) = cli.max_prune_percent {
        config.max_prune_percent = percent;
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = load_config(&cli)?;
    let storage = StorageConfig {
        db_path: shellexpand::tilde(&cli.db_path).to_string(),
        storage_mode: cli.storage_mode.parse().map_err(|e: String| anyhow!(e))?,
    };
    let engine = RetentionEngine::open(storage, config).context("opening memory store")?;

    match cli.command {
        Commands::Score {
            content,
            kind,
            context,
            explain,
        } => {
            let kind: MemoryKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let context = context.into_context()?;
            let breakdown = engine.explain_score(&content, &context, kind);
            if explain {
                println!("{}", breakdown.explain());
                print_json(&breakdown)?;
            } else {
                println!("{:.4}", breakdown.score);
            }
        }

        Commands::Store {
            owner,
            content,
            kind,
            visibility,
            context,
        } => {
            let kind: MemoryKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let visibility: Visibility = visibility.parse().map_err(|e: String| anyhow!(e))?;
            let context = context.into_context()?;
            let record = engine.store_memory(&owner, &content, &context, kind, visibility)?;
            println!("Stored memory #{} ({:.3})", record.id, record.importance);
        }

        Commands::Stats { owner } => {
            print_json(&engine.get_memory_stats(&owner)?)?;
        }

        Commands::Preview { owner, prune } => {
            print_json(&engine.prune_preview(&owner, &prune.options())?)?;
        }

        Commands::Prune { owner, prune } => {
            let result = engine.prune(&owner, &prune.options())?;
            if let Some(reason) = result.abort_reason {
                eprintln!("Prune aborted: {}", reason);
            }
            print_json(&result)?;
        }

        Commands::Recommend { owner } => {
            let recommendation = engine.recommend_pruning(&owner)?;
            println!("{}", recommendation.summary());
            print_json(&recommendation)?;
        }

        Commands::Decay { owner, factor } => {
            let metrics = match (owner, factor) {
                (Some(owner), Some(factor)) => engine.force_decay_owner(&owner, factor)?,
                _ => engine.run_decay_cycle().await,
            };
            print_json(&metrics)?;
        }

        Commands::Serve => {
            engine.start_decay()?;
            tracing::info!(
                interval_ms = engine.config().decay_interval_ms,
                "Decay scheduler running; press Ctrl-C to stop"
            );
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            engine.stop_decay().await?;
            print_json(&engine.decay_stats())?;
        }
    }

    Ok(())
}
