//! Configuration for the usage meter

use crate::config::{parse_var, Lookup};
use crate::error::{GenCacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Daily thresholds and advisory tuning for [`UsageMeter`](super::UsageMeter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Daily warning threshold per metric name
    pub warn_thresholds: HashMap<String, u64>,

    /// Length of a usage window before counters reset
    pub window: Duration,

    /// Fraction of a threshold at which "approaching" advice starts
    pub approaching_ratio: f64,

    /// Minimum call volume before the saved ratio is judged
    pub min_calls_for_ratio: u64,

    /// Saved ratio below which more aggressive caching is suggested
    pub low_saved_ratio: f64,

    /// Total calls above which debouncing or batching is suggested
    pub debounce_hint_calls: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        let warn_thresholds = [("generation-calls", 50), ("image-calls", 20), ("speech-calls", 30)]
            .into_iter()
            .map(|(metric, limit)| (metric.to_string(), limit))
            .collect();

        Self {
            warn_thresholds,
            // Rolling daily window
            window: Duration::from_secs(24 * 60 * 60),
            approaching_ratio: 0.8,
            min_calls_for_ratio: 10,
            low_saved_ratio: 0.2,
            debounce_hint_calls: 100,
        }
    }
}

impl UsageConfig {
    /// Set (or replace) the daily threshold for `metric`
    pub fn with_threshold(mut self, metric: impl Into<String>, limit: u64) -> Self {
        self.warn_thresholds.insert(metric.into(), limit);
        self
    }

    /// Threshold configured for `metric`, if any
    pub fn threshold(&self, metric: &str) -> Option<u64> {
        self.warn_thresholds.get(metric).copied()
    }

    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("GENCACHE_WARN_THRESHOLDS") {
            config.warn_thresholds.extend(parse_thresholds(&raw)?);
        }
        if let Some(secs) = parse_var::<u64>(lookup, "GENCACHE_USAGE_WINDOW_SECS")? {
            config.window = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(GenCacheError::Config(
                "usage window must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.approaching_ratio) {
            return Err(GenCacheError::Config(
                "approaching_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.low_saved_ratio) {
            return Err(GenCacheError::Config(
                "low_saved_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse `metric=limit` pairs separated by commas
fn parse_thresholds(raw: &str) -> Result<HashMap<String, u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (metric, limit) = pair.split_once('=').ok_or_else(|| {
                GenCacheError::Config(format!(
                    "GENCACHE_WARN_THRESHOLDS: expected metric=limit, got {:?}",
                    pair
                ))
            })?;
            let limit = limit.trim().parse::<u64>().map_err(|e| {
                GenCacheError::Config(format!("GENCACHE_WARN_THRESHOLDS: {:?}: {}", pair, e))
            })?;
            Ok((metric.trim().to_string(), limit))
        })
        .collect()
}
