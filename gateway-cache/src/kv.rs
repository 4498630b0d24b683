//! KV Cache (C7): namespaced string-keyed store with TTL, pattern
//! invalidation and counter ops, backed by an embedded LMDB environment
//! (same engine the teacher's tenant cache uses).

use crate::freshness::Freshness;
use async_trait::async_trait;
use gateway_core::{CacheError, GatewayClock, GatewayResult, SharedClock};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: serde_json::Value,
    expires_at_secs: i64,
}

/// Cache operations from spec §4.6.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str, freshness: Freshness) -> GatewayResult<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl: std::time::Duration) -> GatewayResult<()>;
    async fn delete(&self, key: &str) -> GatewayResult<()>;
    async fn exists(&self, key: &str) -> GatewayResult<bool>;
    /// Atomically increment a counter key, creating it at 1 if absent.
    async fn incr(&self, key: &str, ttl: std::time::Duration) -> GatewayResult<u64>;
    async fn ttl(&self, key: &str) -> GatewayResult<Option<std::time::Duration>>;
    /// Non-blocking iteration per spec §4.6.
    async fn scan(&self, pattern: &str) -> GatewayResult<Vec<String>>;
    async fn flush(&self, pattern: &str) -> GatewayResult<u64>;
}

/// Single-unnamed-database LMDB-backed cache.
pub struct LmdbKvCache {
    env: Env,
    db: Database<Str, Bytes>,
    clock: SharedClock,
}

impl LmdbKvCache {
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize, clock: SharedClock) -> GatewayResult<Self> {
        std::fs::create_dir_all(&path).map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;

        Ok(Self { env, db, clock })
    }

    fn read_raw(&self, key: &str) -> GatewayResult<Option<StoredValue>> {
        let rtxn = self.env.read_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        match self.db.get(&rtxn, key).map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })? {
            Some(bytes) => {
                let stored: StoredValue =
                    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialize {
                        reason: e.to_string(),
                    })?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    fn write_raw(&self, key: &str, stored: &StoredValue) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(stored).map_err(|e| CacheError::Serialize {
            reason: e.to_string(),
        })?;
        let mut wtxn = self.env.write_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        self.db
            .put(&mut wtxn, key, &bytes)
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl KvCache for LmdbKvCache {
    async fn get(&self, key: &str, freshness: Freshness) -> GatewayResult<Option<serde_json::Value>> {
        if freshness == Freshness::Consistent {
            return Ok(None);
        }
        let now = self.clock.now_utc().timestamp();
        match self.read_raw(key)? {
            Some(stored) if stored.expires_at_secs > now => Ok(Some(stored.value)),
            Some(_) => {
                self.delete(key).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: std::time::Duration) -> GatewayResult<()> {
        let expires_at_secs = self.clock.now_utc().timestamp() + ttl.as_secs() as i64;
        self.write_raw(
            key,
            &StoredValue {
                value,
                expires_at_secs,
            },
        )
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        Ok(self.get(key, Freshness::BestEffort).await?.is_some())
    }

    async fn incr(&self, key: &str, ttl: std::time::Duration) -> GatewayResult<u64> {
        // Counter and TTL MUST be set atomically on first write (spec §4.2/4.6).
        let mut wtxn = self.env.write_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let now = self.clock.now_utc().timestamp();
        let current = self
            .db
            .get(&wtxn, key)
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?
            .map(|bytes| serde_json::from_slice::<StoredValue>(bytes))
            .transpose()
            .map_err(|e| CacheError::Serialize {
                reason: e.to_string(),
            })?;

        let (count, expires_at_secs) = match current {
            Some(stored) if stored.expires_at_secs > now => {
                let count = stored.value.as_u64().unwrap_or(0) + 1;
                (count, stored.expires_at_secs)
            }
            _ => (1u64, now + ttl.as_secs() as i64),
        };

        let stored = StoredValue {
            value: serde_json::Value::from(count),
            expires_at_secs,
        };
        let bytes = serde_json::to_vec(&stored).map_err(|e| CacheError::Serialize {
            reason: e.to_string(),
        })?;
        self.db
            .put(&mut wtxn, key, &bytes)
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> GatewayResult<Option<std::time::Duration>> {
        let now = self.clock.now_utc().timestamp();
        Ok(self.read_raw(key)?.and_then(|stored| {
            let remaining = stored.expires_at_secs - now;
            if remaining > 0 {
                Some(std::time::Duration::from_secs(remaining as u64))
            } else {
                None
            }
        }))
    }

    async fn scan(&self, pattern: &str) -> GatewayResult<Vec<String>> {
        let regex = glob_to_regex(pattern);
        let rtxn = self.env.read_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let iter = self.db.iter(&rtxn).map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let mut matched = Vec::new();
        for entry in iter {
            let (key, _) = entry.map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;
            if regex.is_match(key) {
                matched.push(key.to_string());
            }
        }
        Ok(matched)
    }

    async fn flush(&self, pattern: &str) -> GatewayResult<u64> {
        let keys = self.scan(pattern).await?;
        let mut wtxn = self.env.write_txn().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let mut deleted = 0u64;
        for key in &keys {
            if self
                .db
                .delete(&mut wtxn, key)
                .map_err(|e| CacheError::Backend {
                    reason: e.to_string(),
                })?
            {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        Ok(deleted)
    }
}

/// `*`-glob to anchored regex, the only wildcard spec §4.6's `flush(pattern)`
/// and §4.11's `flush("search:*")` need.
fn glob_to_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    Regex::new(&format!("^{escaped}$")).expect("glob pattern compiles to a valid regex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;
    use serde_json::json;

    fn cache() -> (LmdbKvCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = LmdbKvCache::open(dir.path(), 10, system_clock()).unwrap();
        (cache, dir)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (cache, _dir) = cache();
        cache
            .set("search:abc", json!({"q": "acme"}), std::time::Duration::from_secs(60))
            .await
            .unwrap();
        let value = cache.get("search:abc", Freshness::BestEffort).await.unwrap();
        assert_eq!(value, Some(json!({"q": "acme"})));
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let (cache, _dir) = cache();
        cache
            .set("search:abc", json!(1), std::time::Duration::from_secs(0))
            .await
            .unwrap();
        let value = cache.get("search:abc", Freshness::BestEffort).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn consistent_freshness_forces_a_miss() {
        let (cache, _dir) = cache();
        cache
            .set("search:abc", json!(1), std::time::Duration::from_secs(600))
            .await
            .unwrap();
        let value = cache.get("search:abc", Freshness::Consistent).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn incr_creates_then_increments() {
        let (cache, _dir) = cache();
        let first = cache.incr("rate:insee:t1", std::time::Duration::from_secs(60)).await.unwrap();
        let second = cache.incr("rate:insee:t1", std::time::Duration::from_secs(60)).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn flush_pattern_removes_matching_keys_only() {
        let (cache, _dir) = cache();
        cache.set("search:a", json!(1), std::time::Duration::from_secs(60)).await.unwrap();
        cache.set("search:b", json!(1), std::time::Duration::from_secs(60)).await.unwrap();
        cache.set("profile:a", json!(1), std::time::Duration::from_secs(60)).await.unwrap();
        let deleted = cache.flush("search:*").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(cache.exists("profile:a").await.unwrap());
    }
}
