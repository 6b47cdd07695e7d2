//! # gencache
//!
//! Caching, deduplication and usage metering for expensive, rate-limited
//! remote generation calls (text and image generation, speech synthesis).
//!
//! ## Features
//!
//! - Two-tier TTL cache keyed by order- and case-insensitive inputs
//! - Exactly-one in-flight invocation per key for concurrent callers
//! - Per-key debouncing of bursty callers
//! - Rate-limited batching in fixed-size concurrent groups
//! - Daily usage counters with threshold warnings and advisories
//!
//! ## Cache
//!
//! ```rust
//! use gencache::cache::{derive_key, CacheConfig, CacheStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: CacheStore<String> = CacheStore::in_memory(CacheConfig::default());
//!
//!     let key = derive_key("recipe", &["Tomato", "cheese"]);
//!     assert_eq!(key, derive_key("recipe", &["CHEESE", "tomato"]));
//!
//!     cache.set(key.clone(), "caprese".to_string(), Duration::from_secs(60)).await;
//!     assert_eq!(cache.get(&key).await.as_deref(), Some("caprese"));
//! }
//! ```
//!
//! ## Generation Service
//!
//! The service wires the three components into the usual control flow:
//! cache lookup, then a deduplicated call on miss, then storing and metering.
//!
//! ```no_run
//! use gencache::{GenCacheConfig, GenerationService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = GenerationService::<String>::open(GenCacheConfig::from_env()?).await?;
//!
//!     let narration = service
//!         .call("narration", &["chapter-3"], "speech-calls", || async {
//!             Ok("Once upon a time...".to_string())
//!         })
//!         .await?;
//!     println!("{}", narration);
//!
//!     if service.meter().should_warn() {
//!         for suggestion in service.meter().suggestions() {
//!             println!("{}", suggestion);
//!         }
//!     }
//!     service.save_usage().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod usage;

// Re-export main types for convenience
pub use cache::{
    derive_key, spawn_auto_sweep, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey,
    CacheKeyBuilder, CacheStats, CacheStore, Category, FileTier, MemoryTier, PersistentTier, Tier,
};
pub use config::GenCacheConfig;
pub use coordinator::{CoordinatorConfig, RequestCoordinator};
pub use error::{GenCacheError, Result};
pub use service::GenerationService;
pub use usage::{UsageConfig, UsageMeter, UsageSnapshot};
