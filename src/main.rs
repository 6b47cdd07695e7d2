use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gencache::{
    derive_key, CacheConfig, CacheStore, FileTier, GenCacheConfig, PersistentTier, UsageMeter,
};

#[derive(Parser)]
#[command(name = "gencache")]
#[command(about = "Inspect and maintain a generation cache directory", long_about = None)]
struct Cli {
    /// Cache directory (overrides GENCACHE_CACHE_DIR)
    #[arg(short, long)]
    cache_dir: Option<PathBuf>,

    /// Key namespace (overrides GENCACHE_NAMESPACE)
    #[arg(short, long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache key derived from a category and inputs
    Key {
        /// Category tag (e.g. recipe, narration, image, speech)
        category: String,

        /// Semantic inputs; order and case are ignored
        inputs: Vec<String>,
    },

    #[command(flatten)]
    Store(StoreCommands),
}

/// Subcommands that open the cache directory
#[derive(Subcommand)]
enum StoreCommands {
    /// Print a cached value as JSON
    Get {
        /// Cache key
        key: String,
    },

    /// Remove a cached value
    Delete {
        /// Cache key
        key: String,
    },

    /// Remove expired and unreadable entries
    Sweep,

    /// Show cache statistics
    Stats,

    /// Show usage counters and suggestions
    Usage,

    /// Reset usage counters
    ResetUsage,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gencache=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Cli {
        cache_dir,
        namespace,
        command,
    } = Cli::parse();

    match command {
        Commands::Key { category, inputs } => {
            println!("{}", derive_key(category, inputs.as_slice()));
            Ok(())
        }
        Commands::Store(command) => {
            run_store_command(command, load_config(cache_dir, namespace)?).await
        }
    }
}

/// Run a subcommand against the configured cache directory
async fn run_store_command(command: StoreCommands, config: GenCacheConfig) -> Result<()> {
    let cache_dir = config
        .cache
        .cache_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./data/cache"));

    let tier: Arc<dyn PersistentTier> = Arc::new(
        FileTier::open(cache_dir.clone())
            .await
            .with_context(|| format!("Failed to open cache directory {:?}", cache_dir))?,
    );
    let namespace = config.cache.namespace.clone();

    match command {
        StoreCommands::Get { ref key } => {
            let cache = open_store(config.cache, tier);
            match cache.get(key).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("Not cached: {}", key),
            }
        }

        StoreCommands::Delete { ref key } => {
            let cache = open_store(config.cache, tier);
            cache.delete(key).await;
            println!("Deleted {}", key);
        }

        StoreCommands::Sweep => {
            let cache = open_store(config.cache, tier);
            let removed = cache.sweep_expired().await.context("Sweep failed")?;
            println!("Removed {} expired entries", removed);
        }

        StoreCommands::Stats => {
            let cache = open_store(config.cache, tier);
            let stats = cache.stats().await;
            println!("Cache: {:?}", cache_dir);
            println!("{}", "=".repeat(50));
            println!("Namespace:      {}", namespace);
            println!("Total entries:  {}", stats.total_entries);
            println!("In process:     {}", stats.in_process_entries);
            println!("Failures:       {}", stats.persistent_failures);
        }

        StoreCommands::Usage => {
            let meter = UsageMeter::load(tier.as_ref(), &namespace, config.usage).await;
            let usage = meter.usage();

            println!("Usage since {}", usage.window_start.format("%Y-%m-%d %H:%M"));
            println!("{}", "=".repeat(50));
            if usage.calls.is_empty() && usage.saved.is_empty() {
                println!("No calls recorded.");
            }
            let mut metrics: Vec<&String> = usage.calls.keys().chain(usage.saved.keys()).collect();
            metrics.sort();
            metrics.dedup();
            for metric in metrics {
                let limit = meter
                    .config()
                    .threshold(metric)
                    .map(|limit| format!(" / {}", limit))
                    .unwrap_or_default();
                println!(
                    "  {:<20} {}{} calls, {} saved",
                    metric,
                    usage.calls(metric),
                    limit,
                    usage.saved(metric)
                );
            }

            let suggestions = meter.suggestions();
            if !suggestions.is_empty() {
                println!();
                println!("Suggestions:");
                for suggestion in suggestions {
                    println!("  - {}", suggestion);
                }
            }
        }

        StoreCommands::ResetUsage => {
            let meter = UsageMeter::new(config.usage);
            meter
                .save(tier.as_ref(), &namespace)
                .await
                .context("Failed to save usage counters")?;
            println!("Usage counters reset");
        }
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied
fn load_config(cache_dir: Option<PathBuf>, namespace: Option<String>) -> Result<GenCacheConfig> {
    let mut config = GenCacheConfig::from_env().context("Invalid GENCACHE_* configuration")?;

    if let Some(dir) = cache_dir {
        config.cache.cache_dir = Some(dir);
    }
    if let Some(namespace) = namespace {
        config.cache.namespace = namespace;
    }

    config.validate()?;
    Ok(config)
}

/// The CLI works with whatever JSON the entries hold
fn open_store(
    config: CacheConfig,
    tier: Arc<dyn PersistentTier>,
) -> CacheStore<serde_json::Value> {
    CacheStore::new(config, tier)
}
