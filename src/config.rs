//! Process-wide configuration assembled from the environment
//!
//! Every component has its own config with sensible defaults; this module
//! bundles them and reads `GENCACHE_*` overrides (after loading `.env`).

use crate::cache::CacheConfig;
use crate::coordinator::CoordinatorConfig;
use crate::error::{GenCacheError, Result};
use crate::usage::UsageConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Variable lookup, `std::env::var` in production and a closure in tests
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Parse an optional variable, reporting malformed values as config errors
pub(crate) fn parse_var<T: FromStr>(lookup: &Lookup<'_>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| GenCacheError::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}

/// Configuration for every gencache component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenCacheConfig {
    /// Two-tier cache store
    pub cache: CacheConfig,

    /// Dedup / debounce / batch coordinator
    pub coordinator: CoordinatorConfig,

    /// Usage meter thresholds and advisories
    pub usage: UsageConfig,
}

impl GenCacheConfig {
    /// Load `.env` (if present) and read `GENCACHE_*` variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        Ok(Self {
            cache: CacheConfig::from_lookup(lookup)?,
            coordinator: CoordinatorConfig::from_lookup(lookup)?,
            usage: UsageConfig::from_lookup(lookup)?,
        })
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.coordinator.validate()?;
        self.usage.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GenCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_lookup_reads_every_section() {
        let lookup = |name: &str| match name {
            "GENCACHE_DEFAULT_TTL_SECS" => Some("60".to_string()),
            "GENCACHE_DEBOUNCE_MS" => Some("250".to_string()),
            "GENCACHE_WARN_THRESHOLDS" => Some("generation-calls=50".to_string()),
            _ => None,
        };

        let config = GenCacheConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.cache.default_ttl, Duration::from_secs(60));
        assert_eq!(config.coordinator.debounce_delay, Duration::from_millis(250));
        assert_eq!(config.usage.warn_thresholds.get("generation-calls"), Some(&50));
    }

    #[test]
    fn test_parse_var_reports_name() {
        let lookup = |_: &str| Some("abc".to_string());
        let err = parse_var::<u64>(&lookup, "GENCACHE_BATCH_SIZE").unwrap_err();
        assert!(err.to_string().contains("GENCACHE_BATCH_SIZE"));
    }
}
