//! Cache entry management with TTL support

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached payload together with the moment it was stored and its TTL
///
/// The entry is valid iff `now - created_at < ttl`. The same shape is used in
/// both tiers; the persistent tier stores it as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cache key
    pub key: CacheKey,

    /// The cached value, opaque to the cache
    pub value: T,

    /// When the entry was inserted
    pub created_at: DateTime<Utc>,

    /// Time-to-live, serialized as whole milliseconds
    #[serde(with = "ttl_millis")]
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create a new entry stamped with the current time
    pub fn new(key: CacheKey, value: T, ttl: Duration) -> Self {
        Self::created_at(key, value, ttl, Utc::now())
    }

    /// Create a new entry with an explicit creation time
    pub fn created_at(key: CacheKey, value: T, ttl: Duration, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            created_at,
            ttl,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against a given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) >= self.ttl
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    fn age_at(&self, now: DateTime<Utc>) -> Duration {
        // Clock skew can put created_at in the future; treat that as age zero.
        (now - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        self.ttl.checked_sub(self.age()).filter(|d| !d.is_zero())
    }

    /// When the entry stops being valid
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

mod ttl_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
