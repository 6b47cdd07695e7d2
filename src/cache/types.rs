//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - canonical string derived from semantic inputs
pub type CacheKey = String;

/// Statistics for cache observability
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries under this store's persistent namespace
    pub total_entries: usize,

    /// Number of entries currently held in process
    pub in_process_entries: usize,

    /// Total number of cache hits (either tier)
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Hits served by promoting a persistent entry into process
    pub promotions: u64,

    /// Entries dropped because their TTL elapsed
    pub evictions_ttl: u64,

    /// Persistent tier failures that were swallowed
    pub persistent_failures: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ total_entries: {}, in_process_entries: {}, hits: {}, misses: {}, hit_rate: {:.2}%, persistent_failures: {} }}",
            self.total_entries,
            self.in_process_entries,
            self.hits,
            self.misses,
            self.hit_rate(),
            self.persistent_failures
        )
    }
}

/// Storage tier an entry was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Fast in-process map
    InProcess,

    /// Durable tier that survives restarts
    Persistent,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::InProcess => write!(f, "in_process"),
            Tier::Persistent => write!(f, "persistent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            total_entries: 12,
            in_process_entries: 7,
            hits: 100,
            misses: 50,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("total_entries: 12"));
        assert!(display.contains("hits: 100"));
        assert!(display.contains("misses: 50"));
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(format!("{}", Tier::InProcess), "in_process");
        assert_eq!(format!("{}", Tier::Persistent), "persistent");
    }
}
