//! Persistent tier abstraction and its two backends
//!
//! The cache only needs four primitives from durable storage: read, write,
//! remove and prefix listing. Values are opaque serialized strings.

use crate::error::{GenCacheError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Durable key-value collaborator behind the cache
///
/// Implementations report failures through `Result`; the cache decides
/// whether a failure is fatal (it never is for cache traffic).
#[async_trait]
pub trait PersistentTier: Send + Sync {
    /// Read the serialized entry stored under `key`
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store a serialized entry under `key`, replacing any previous value
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// List every key starting with `prefix`
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory persistent tier, optionally bounded by a byte quota
///
/// Useful for tests and for processes that want the two-tier semantics
/// without touching disk.
#[derive(Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryTier {
    /// Create an unbounded memory tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory tier that rejects writes once `quota_bytes` would be exceeded
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the tier is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentTier for MemoryTier {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        if let Some(limit) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > limit {
                return Err(GenCacheError::QuotaExceeded { limit_bytes: limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// File-backed persistent tier: one JSON file per key
///
/// File names are the hex SHA-256 of the key, so keys of any length and
/// content map to a fixed 64 character name. The key itself is kept inside
/// the file for listing. Writes land in a hidden temp file first and are
/// then renamed into place, so a reader never observes a half-written entry.
pub struct FileTier {
    base_dir: PathBuf,
}

/// On-disk layout of one entry file
#[derive(Serialize, Deserialize)]
struct StoredFile {
    key: String,
    value: String,
}

impl FileTier {
    /// Open (and create if needed) a file tier rooted at `base_dir`
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        info!("Opened file tier at {:?}", base_dir);
        Ok(Self { base_dir })
    }

    /// Directory holding the entry files
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.json", hex::encode(Sha256::digest(key.as_bytes()))))
    }

    fn is_entry_file(path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return false;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .map_or(false, |s| s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()))
    }

    async fn read_file(path: &Path) -> Result<Option<StoredFile>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PersistentTier for FileTier {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        match Self::read_file(&self.path_for(key)).await? {
            Some(stored) if stored.key == key => Ok(Some(stored.value)),
            Some(stored) => Err(GenCacheError::Storage(format!(
                "digest collision between {:?} and {:?}",
                key, stored.key
            ))),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let tmp = self
            .base_dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        let stored = StoredFile {
            key: key.to_string(),
            value: value.to_string(),
        };
        tokio::fs::write(&tmp, serde_json::to_string(&stored)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Wrote {} bytes for key {}", value.len(), key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !Self::is_entry_file(&path) {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(Some(stored)) if stored.key.starts_with(prefix) => keys.push(stored.key),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry file {:?}: {}", path, e),
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_tier_crud() {
        let tier = MemoryTier::new();

        tier.write("gencache:a", "1").await.unwrap();
        tier.write("gencache:b", "2").await.unwrap();
        tier.write("other:c", "3").await.unwrap();

        assert_eq!(tier.read("gencache:a").await.unwrap(), Some("1".to_string()));
        assert_eq!(tier.read("missing").await.unwrap(), None);

        let mut keys = tier.list_keys("gencache:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["gencache:a", "gencache:b"]);

        tier.remove("gencache:a").await.unwrap();
        tier.remove("gencache:a").await.unwrap();
        assert_eq!(tier.read("gencache:a").await.unwrap(), None);
        assert_eq!(tier.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_tier_quota() {
        let tier = MemoryTier::with_quota(10);

        tier.write("k1", "abc").await.unwrap();
        let err = tier.write("k2", "too large value").await.unwrap_err();
        assert!(matches!(err, GenCacheError::QuotaExceeded { limit_bytes: 10 }));

        // Overwriting an existing key only counts the new size
        tier.write("k1", "abcdefgh").await.unwrap();
        assert_eq!(tier.read("k1").await.unwrap(), Some("abcdefgh".to_string()));
    }

    #[tokio::test]
    async fn test_file_tier_crud() {
        let tmp = TempDir::new().unwrap();
        let tier = FileTier::open(tmp.path()).await.unwrap();

        tier.write("gencache:recipe:egg,flour", "{}").await.unwrap();
        tier.write("gencache:narration:intro", "[]").await.unwrap();

        assert_eq!(
            tier.read("gencache:recipe:egg,flour").await.unwrap(),
            Some("{}".to_string())
        );
        assert_eq!(tier.read("gencache:nothing").await.unwrap(), None);

        let mut keys = tier.list_keys("gencache:").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec!["gencache:narration:intro", "gencache:recipe:egg,flour"]
        );

        tier.remove("gencache:narration:intro").await.unwrap();
        tier.remove("gencache:narration:intro").await.unwrap();
        assert_eq!(tier.list_keys("gencache:").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_tier_survives_reopen() {
        let tmp = TempDir::new().unwrap();

        {
            let tier = FileTier::open(tmp.path()).await.unwrap();
            tier.write("gencache:k", "v").await.unwrap();
        }

        let reopened = FileTier::open(tmp.path()).await.unwrap();
        assert_eq!(reopened.read("gencache:k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_file_tier_long_keys_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let key = format!(
            "gencache:recipe:{}",
            [
                "buffalo mozzarella",
                "dried oregano",
                "extra virgin olive oil",
                "fresh basil leaves",
                "roasted garlic",
                "salted capers",
                "san marzano tomato",
                "smoked anchovy fillets",
                "sourdough starter",
            ]
            .join(",")
        );
        assert!(key.len() > 123);

        {
            let tier = FileTier::open(tmp.path()).await.unwrap();
            tier.write(&key, "{\"value\":\"pizza\"}").await.unwrap();
        }

        let reopened = FileTier::open(tmp.path()).await.unwrap();
        assert_eq!(
            reopened.read(&key).await.unwrap(),
            Some("{\"value\":\"pizza\"}".to_string())
        );
        assert_eq!(reopened.list_keys("gencache:recipe:").await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_file_tier_ignores_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let tier = FileTier::open(tmp.path()).await.unwrap();

        std::fs::write(tmp.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(tmp.path().join("zz-not-hex.json"), "{}").unwrap();
        std::fs::write(tmp.path().join(".abc.tmp"), "partial").unwrap();
        tier.write("gencache:k", "v").await.unwrap();

        assert_eq!(tier.list_keys("").await.unwrap(), vec!["gencache:k"]);
    }
}
