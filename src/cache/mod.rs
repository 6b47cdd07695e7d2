//! # Two-Tier Generation Cache
//!
//! TTL-bounded memoization of generated artifacts keyed by canonical
//! strings derived from the request's semantic inputs.
//!
//! ## Features
//!
//! - **Canonical keys**: input order and case never change the key
//! - **Two tiers**: an in-process map in front of a durable [`PersistentTier`]
//! - **Lazy and eager expiry**: expired entries are dropped on read and by sweeps
//! - **Best-effort durability**: persistent-tier failures are logged, never raised
//!
//! ## Example
//!
//! ```rust
//! use gencache::cache::{derive_key, CacheConfig, CacheStore};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let cache: CacheStore<String> = CacheStore::in_memory(CacheConfig::default());
//!
//! let key = derive_key("recipe", &["Egg", "flour"]);
//! cache.set(key.clone(), "pancakes".to_string(), Duration::from_secs(3600)).await;
//!
//! if let Some(value) = cache.get(&key).await {
//!     println!("Cache hit: {}", value);
//! }
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod key;
pub mod persistent;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use key::{derive_key, CacheKeyBuilder, Category};
pub use persistent::{FileTier, MemoryTier, PersistentTier};
pub use store::{spawn_auto_sweep, CacheStore};
pub use types::{CacheKey, CacheStats, Tier};
