//! Configuration for the cache system

use crate::config::{parse_var, Lookup};
use crate::error::{GenCacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the two-tier cache store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prefix for every key written to the persistent tier
    pub namespace: String,

    /// Time-to-live used when a caller does not pass one
    pub default_ttl: Duration,

    /// Per-category TTL overrides, keyed by category tag
    pub category_ttls: HashMap<String, Duration>,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    /// Directory for the file-backed persistent tier
    pub cache_dir: Option<PathBuf>,

    /// Run `sweep_expired` periodically in the background
    ///
    /// On by default: without it, expired in-process entries are only
    /// dropped when their key is read again. `GenerationService::open`
    /// honours this flag; a bare `CacheStore` needs `spawn_auto_sweep`.
    pub enable_auto_sweep: bool,

    /// Interval between background sweeps
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "gencache".to_string(),
            // 1 hour default TTL
            default_ttl: Duration::from_secs(3600),
            category_ttls: HashMap::new(),
            ttl_jitter: 0.0,
            cache_dir: None,
            enable_auto_sweep: true,
            // Sweep every 5 minutes
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Read overrides from `GENCACHE_*` variables on top of the defaults
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(namespace) = lookup("GENCACHE_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(secs) = parse_var::<u64>(lookup, "GENCACHE_DEFAULT_TTL_SECS")? {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(jitter) = parse_var::<f64>(lookup, "GENCACHE_TTL_JITTER")? {
            config.ttl_jitter = jitter;
        }
        if let Some(dir) = lookup("GENCACHE_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parse_var::<u64>(lookup, "GENCACHE_SWEEP_INTERVAL_SECS")? {
            config.enable_auto_sweep = secs > 0;
            if secs > 0 {
                config.sweep_interval = Duration::from_secs(secs);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(GenCacheError::Config("namespace must not be empty".to_string()));
        }

        if self.default_ttl.is_zero() {
            return Err(GenCacheError::Config(
                "default_ttl must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(GenCacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.enable_auto_sweep && self.sweep_interval.is_zero() {
            return Err(GenCacheError::Config(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// TTL for a category: its override if configured, else the default with jitter
    pub fn ttl_for(&self, category: &str) -> Duration {
        self.category_ttls
            .get(category)
            .copied()
            .unwrap_or_else(|| self.ttl_with_jitter())
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }

    /// Short-lived entries, for previews and rapidly changing prompts
    pub fn ephemeral() -> Self {
        Self {
            default_ttl: Duration::from_secs(300), // 5 minutes
            ttl_jitter: 0.1,
            ..Default::default()
        }
    }

    /// Long-lived generated content: recipes for a day, audio for a week
    pub fn long_lived() -> Self {
        let mut category_ttls = HashMap::new();
        category_ttls.insert("recipe".to_string(), Duration::from_secs(24 * 3600));
        category_ttls.insert("narration".to_string(), Duration::from_secs(24 * 3600));
        category_ttls.insert("speech".to_string(), Duration::from_secs(7 * 24 * 3600));
        category_ttls.insert("image".to_string(), Duration::from_secs(7 * 24 * 3600));

        Self {
            default_ttl: Duration::from_secs(12 * 3600),
            category_ttls,
            sweep_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    namespace: Option<String>,
    default_ttl: Option<Duration>,
    category_ttls: HashMap<String, Duration>,
    ttl_jitter: Option<f64>,
    cache_dir: Option<PathBuf>,
    enable_auto_sweep: Option<bool>,
    sweep_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set the persistent key namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Override the TTL of one category
    pub fn category_ttl(mut self, category: impl Into<String>, ttl: Duration) -> Self {
        self.category_ttls.insert(category.into(), ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the directory of the file-backed tier
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Enable or disable background sweeping
    pub fn enable_auto_sweep(mut self, enable: bool) -> Self {
        self.enable_auto_sweep = Some(enable);
        self
    }

    /// Set sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            namespace: self.namespace.unwrap_or(defaults.namespace),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            category_ttls: self.category_ttls,
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            cache_dir: self.cache_dir.or(defaults.cache_dir),
            enable_auto_sweep: self
                .enable_auto_sweep
                .unwrap_or(defaults.enable_auto_sweep),
            sweep_interval: self.sweep_interval.unwrap_or(defaults.sweep_interval),
        }
    }
}
