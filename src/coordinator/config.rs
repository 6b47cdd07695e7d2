//! Configuration for the request coordinator

use crate::config::{parse_var, Lookup};
use crate::error::{GenCacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for dedup, debounce and batch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Quiet period used by callers that do not pick their own
    pub debounce_delay: Duration,

    /// Operations per concurrent batch group
    pub batch_size: usize,

    /// Pause inserted between batch groups to avoid bursting the backend
    pub batch_pause: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(500),
            batch_size: 3,
            batch_pause: Duration::from_millis(100),
        }
    }
}

impl CoordinatorConfig {
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(lookup, "GENCACHE_DEBOUNCE_MS")? {
            config.debounce_delay = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize>(lookup, "GENCACHE_BATCH_SIZE")? {
            config.batch_size = size;
        }
        if let Some(ms) = parse_var::<u64>(lookup, "GENCACHE_BATCH_PAUSE_MS")? {
            config.batch_pause = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GenCacheError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
