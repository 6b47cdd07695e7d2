//! Daily call and saved-call counters with threshold advisories

use crate::cache::PersistentTier;
use crate::error::Result;
use crate::usage::config::UsageConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Counters for one usage window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Invocations per metric
    pub calls: BTreeMap<String, u64>,

    /// Invocations avoided by a cache hit, per metric
    pub saved: BTreeMap<String, u64>,

    /// When the current window opened
    pub window_start: DateTime<Utc>,
}

impl UsageSnapshot {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            calls: BTreeMap::new(),
            saved: BTreeMap::new(),
            window_start: now,
        }
    }

    /// Calls recorded for `metric` (0 if never tracked)
    pub fn calls(&self, metric: &str) -> u64 {
        self.calls.get(metric).copied().unwrap_or(0)
    }

    /// Saved calls recorded for `metric` (0 if never tracked)
    pub fn saved(&self, metric: &str) -> u64 {
        self.saved.get(metric).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.values().sum()
    }

    pub fn total_saved(&self) -> u64 {
        self.saved.values().sum()
    }

    /// Share of requests served from cache: `saved / (calls + saved)`
    pub fn saved_ratio(&self) -> f64 {
        let saved = self.total_saved();
        let total = self.total_calls() + saved;
        if total == 0 {
            0.0
        } else {
            saved as f64 / total as f64
        }
    }
}

/// Metering of expensive calls over a rolling window
///
/// Counters reset lazily: every track and read first checks whether the
/// window has elapsed. Nothing runs in the background.
pub struct UsageMeter {
    config: UsageConfig,
    counters: Mutex<UsageSnapshot>,
}

impl UsageMeter {
    /// Create a meter whose window opens now
    pub fn new(config: UsageConfig) -> Self {
        Self::starting_at(config, Utc::now())
    }

    /// Create a meter whose window opens at `now`
    pub fn starting_at(config: UsageConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            counters: Mutex::new(UsageSnapshot::fresh(now)),
        }
    }

    pub fn config(&self) -> &UsageConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, UsageSnapshot> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the counters, rolling the window over first if it has elapsed
    fn current(&self, now: DateTime<Utc>) -> MutexGuard<'_, UsageSnapshot> {
        let mut counters = self.lock();

        let elapsed = now.signed_duration_since(counters.window_start).to_std();
        if elapsed.map_or(false, |elapsed| elapsed >= self.config.window) {
            info!(
                "Usage window elapsed (opened {}), resetting {} calls and {} saved",
                counters.window_start,
                counters.total_calls(),
                counters.total_saved()
            );
            *counters = UsageSnapshot::fresh(now);
        }

        counters
    }

    /// Record one invocation of `metric`
    pub fn track_call_once(&self, metric: &str) {
        self.track_call_at(metric, 1, Utc::now());
    }

    /// Record `weight` invocations of `metric`
    pub fn track_call(&self, metric: &str, weight: u64) {
        self.track_call_at(metric, weight, Utc::now());
    }

    pub fn track_call_at(&self, metric: &str, weight: u64, now: DateTime<Utc>) {
        let mut counters = self.current(now);
        let count = counters.calls.entry(metric.to_string()).or_insert(0);
        let before = *count;
        *count = count.saturating_add(weight);
        let after = *count;
        drop(counters);

        debug!("Tracked {} call(s) for {} (total {})", weight, metric, after);

        if let Some(limit) = self.config.threshold(metric) {
            if before <= limit && after > limit {
                warn!(
                    "Usage of {} crossed its daily warning threshold: {} > {}",
                    metric, after, limit
                );
            }
        }
    }

    /// Record an invocation of `metric` avoided by a cache hit
    pub fn track_saved(&self, metric: &str) {
        self.track_saved_at(metric, Utc::now());
    }

    pub fn track_saved_at(&self, metric: &str, now: DateTime<Utc>) {
        let mut counters = self.current(now);
        let count = counters.saved.entry(metric.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        debug!("Tracked saved call for {} (total {})", metric, *count);
    }

    /// Snapshot of the current window
    pub fn usage(&self) -> UsageSnapshot {
        self.usage_at(Utc::now())
    }

    pub fn usage_at(&self, now: DateTime<Utc>) -> UsageSnapshot {
        self.current(now).clone()
    }

    /// Whether any metric's calls strictly exceed its daily threshold
    pub fn should_warn(&self) -> bool {
        self.should_warn_at(Utc::now())
    }

    pub fn should_warn_at(&self, now: DateTime<Utc>) -> bool {
        let counters = self.current(now);
        self.config
            .warn_thresholds
            .iter()
            .any(|(metric, limit)| counters.calls(metric) > *limit)
    }

    /// Advisory messages derived from the current window
    pub fn suggestions(&self) -> Vec<String> {
        self.suggestions_at(Utc::now())
    }

    pub fn suggestions_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let counters = self.usage_at(now);
        let mut suggestions = Vec::new();

        let mut thresholds: Vec<_> = self.config.warn_thresholds.iter().collect();
        thresholds.sort();

        for (metric, &limit) in thresholds {
            let calls = counters.calls(metric);
            if calls > limit {
                suggestions.push(format!(
                    "{}: {} calls exceeded the daily warning threshold of {}",
                    metric, calls, limit
                ));
            } else if calls > 0 && calls as f64 >= limit as f64 * self.config.approaching_ratio {
                suggestions.push(format!(
                    "{}: {} of {} calls used, approaching the daily limit",
                    metric, calls, limit
                ));
            }
        }

        let total_calls = counters.total_calls();
        let ratio = counters.saved_ratio();
        if total_calls >= self.config.min_calls_for_ratio && ratio < self.config.low_saved_ratio {
            suggestions.push(format!(
                "Only {:.0}% of requests were served from cache; consider longer TTLs or broader cache keys",
                ratio * 100.0
            ));
        }

        if total_calls > self.config.debounce_hint_calls {
            suggestions.push(format!(
                "{} calls in the current window; consider debouncing or batching bursty callers",
                total_calls
            ));
        }

        suggestions
    }

    /// Zero every counter and open a new window now
    pub fn reset(&self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&self, now: DateTime<Utc>) {
        *self.lock() = UsageSnapshot::fresh(now);
        info!("Usage counters reset");
    }

    /// Persistent-tier key holding the counters for `namespace`
    ///
    /// Lives outside the `"{namespace}:"` cache prefix so sweeps skip it.
    pub fn storage_key(namespace: &str) -> String {
        format!("{}/usage", namespace)
    }

    /// Write the current counters to `tier`
    pub async fn save(&self, tier: &dyn PersistentTier, namespace: &str) -> Result<()> {
        let payload = serde_json::to_string(&*self.lock())?;
        tier.write(&Self::storage_key(namespace), &payload).await
    }

    /// Restore counters from `tier`, starting fresh if absent or unreadable
    pub async fn load(tier: &dyn PersistentTier, namespace: &str, config: UsageConfig) -> Self {
        let key = Self::storage_key(namespace);

        let restored = match tier.read(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<UsageSnapshot>(&raw) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Discarding unreadable usage counters at {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read usage counters at {}: {}", key, e);
                None
            }
        };

        match restored {
            Some(snapshot) => {
                debug!("Restored usage counters from {}", key);
                Self {
                    config,
                    counters: Mutex::new(snapshot),
                }
            }
            None => Self::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTier;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn meter() -> UsageMeter {
        let config = UsageConfig {
            warn_thresholds: [("gen".to_string(), 50), ("speech".to_string(), 30)].into(),
            ..Default::default()
        };
        UsageMeter::starting_at(config, start())
    }

    #[test]
    fn test_track_and_usage() {
        let meter = meter();
        let now = start();

        meter.track_call_at("gen", 1, now);
        meter.track_call_at("gen", 2, now);
        meter.track_saved_at("gen", now);

        let usage = meter.usage_at(now);
        assert_eq!(usage.calls("gen"), 3);
        assert_eq!(usage.saved("gen"), 1);
        assert_eq!(usage.calls("speech"), 0);
        assert_eq!(usage.window_start, start());
    }

    #[test]
    fn test_warning_is_strict() {
        let meter = meter();
        let now = start();

        meter.track_call_at("gen", 50, now);
        assert!(!meter.should_warn_at(now));

        meter.track_call_at("gen", 1, now);
        assert!(meter.should_warn_at(now));
    }

    #[test]
    fn test_window_rollover_resets_before_increment() {
        let meter = meter();

        for _ in 0..51 {
            meter.track_call_at("gen", 1, start());
        }
        assert!(meter.should_warn_at(start()));

        let next_day = start() + ChronoDuration::hours(24);
        meter.track_call_at("gen", 1, next_day);

        let usage = meter.usage_at(next_day);
        assert_eq!(usage.calls("gen"), 1);
        assert_eq!(usage.window_start, next_day);
        assert!(!meter.should_warn_at(next_day));
    }

    #[test]
    fn test_window_not_elapsed_keeps_counters() {
        let meter = meter();
        meter.track_call_at("gen", 5, start());

        let almost = start() + ChronoDuration::hours(23) + ChronoDuration::minutes(59);
        assert_eq!(meter.usage_at(almost).calls("gen"), 5);
    }

    #[test]
    fn test_suggestions() {
        let meter = meter();
        let now = start();

        assert!(meter.suggestions_at(now).is_empty());

        meter.track_call_at("gen", 41, now);
        meter.track_call_at("speech", 31, now);

        let suggestions = meter.suggestions_at(now);
        assert!(suggestions.iter().any(|s| s.starts_with("gen:") && s.contains("approaching")));
        assert!(suggestions.iter().any(|s| s.starts_with("speech:") && s.contains("exceeded")));
        assert!(suggestions.iter().any(|s| s.contains("served from cache")));
        assert!(!suggestions.iter().any(|s| s.contains("debouncing")));

        meter.track_call_at("other", 40, now);
        assert!(meter.suggestions_at(now).iter().any(|s| s.contains("debouncing")));
    }

    #[test]
    fn test_good_saved_ratio_needs_no_advice() {
        let meter = meter();
        let now = start();

        meter.track_call_at("gen", 10, now);
        for _ in 0..10 {
            meter.track_saved_at("gen", now);
        }

        let usage = meter.usage_at(now);
        assert!((usage.saved_ratio() - 0.5).abs() < f64::EPSILON);
        assert!(meter.suggestions_at(now).is_empty());
    }

    #[test]
    fn test_reset() {
        let meter = meter();
        meter.track_call_at("gen", 60, start());

        let later = start() + ChronoDuration::hours(2);
        meter.reset_at(later);

        let usage = meter.usage_at(later);
        assert_eq!(usage.total_calls(), 0);
        assert_eq!(usage.window_start, later);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let tier = MemoryTier::new();
        let meter = meter();
        meter.track_call_at("gen", 7, start());
        meter.track_saved_at("gen", start());

        meter.save(&tier, "gencache").await.unwrap();
        assert!(tier.read("gencache/usage").await.unwrap().is_some());

        let restored = UsageMeter::load(&tier, "gencache", meter.config().clone()).await;
        let usage = restored.usage_at(start());
        assert_eq!(usage.calls("gen"), 7);
        assert_eq!(usage.saved("gen"), 1);
    }

    #[tokio::test]
    async fn test_load_corrupt_starts_fresh() {
        let tier = MemoryTier::new();
        tier.write("gencache/usage", "{not json").await.unwrap();

        let meter = UsageMeter::load(&tier, "gencache", UsageConfig::default()).await;
        assert_eq!(meter.usage().total_calls(), 0);
    }
}
