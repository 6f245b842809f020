//! Query Cache
//!
//! Memoizes retrieval results in a shared key-value store with TTL expiry.
//!
//! The cache never fails its caller: when the store is unreachable at
//! construction every operation becomes a no-op (`get` misses, `set` returns
//! `false`), and store errors during an operation are logged and treated the
//! same way.
//!
//! Consistency with the graph is event driven: the extraction pipeline calls
//! [`QueryCache::invalidate_pattern`] after it finishes writing.

pub mod backend;
pub mod key;
pub mod memory;
pub mod redis;

pub use backend::CacheBackend;
pub use memory::MemoryBackend;
pub use redis::RedisBackend;

use crate::config::CacheConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide hit counter key (outside the namespace, so invalidation keeps it).
pub const HITS_KEY: &str = "cache:hits";
/// Process-wide miss counter key.
pub const MISSES_KEY: &str = "cache:misses";

// =============================================================================
// Types
// =============================================================================

/// A precomputed result used to pre-populate the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmEntry {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub result: Value,
    /// TTL in seconds; the cache default when absent
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Snapshot of cache counters and size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    pub cache_size_keys: u64,
    pub memory_mb: Option<f64>,
    pub default_ttl_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Query Cache
// =============================================================================

#[derive(Debug, Clone)]
pub struct QueryCache {
    backend: Option<Arc<dyn CacheBackend>>,
    namespace: String,
    default_ttl: Duration,
    scan_count: usize,
}

impl QueryCache {
    /// Connect to the configured Redis store, degrading to a disabled cache
    /// when it is switched off or unreachable.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::info!("Query cache disabled by configuration");
            return Self::disabled(config);
        }

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        match RedisBackend::connect(&config.url, timeout).await {
            Ok(backend) => {
                tracing::info!(name: "cache.connected", url = %config.url, "Query cache connected");
                Self::with_backend(Arc::new(backend), config)
            }
            Err(e) => {
                tracing::error!(
                    name: "cache.unavailable",
                    url = %config.url,
                    error = %e,
                    "Failed to connect to cache store, continuing uncached"
                );
                Self::disabled(config)
            }
        }
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend: Some(backend),
            ..Self::disabled(config)
        }
    }

    pub fn disabled(config: &CacheConfig) -> Self {
        Self {
            backend: None,
            namespace: config.namespace.clone(),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            scan_count: config.scan_count.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Deterministic key for `method` called with `args` and `kwargs`.
    pub fn cache_key(&self, method: &str, args: &[Value], kwargs: &Map<String, Value>) -> String {
        key::derive_key(&self.namespace, method, args, kwargs)
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.filter(|t| !t.is_zero()).unwrap_or(self.default_ttl)
    }

    async fn count(backend: &dyn CacheBackend, counter: &str) {
        if let Err(e) = backend.incr(counter).await {
            tracing::debug!(counter, error = %e, "Failed to update cache counter");
        }
    }

    /// Fetch and decode a cached value. Every call counts as a hit or a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_deref()?;

        let raw = match backend.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(key, error = %e, "Cache get error");
                return None;
            }
        };

        let Some(raw) = raw else {
            Self::count(backend, MISSES_KEY).await;
            tracing::debug!(key, "Cache MISS");
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                Self::count(backend, HITS_KEY).await;
                tracing::debug!(key, "Cache HIT");
                Some(value)
            }
            Err(e) => {
                Self::count(backend, MISSES_KEY).await;
                tracing::error!(key, error = %e, "Cached value could not be decoded");
                None
            }
        }
    }

    /// Serialize and store `value`. With `only_if_absent`, a live entry is never overwritten.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        only_if_absent: bool,
    ) -> bool {
        let Some(backend) = self.backend.as_deref() else {
            return false;
        };

        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(key, error = %e, "Cache value could not be serialized");
                return false;
            }
        };

        let ttl = self.resolve_ttl(ttl);
        match backend.set(key, &encoded, ttl, only_if_absent).await {
            Ok(written) => {
                if written {
                    tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache SET");
                }
                written
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Cache set error");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_deref() else {
            return false;
        };

        match backend.delete(&[key.to_string()]).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::debug!(key, "Cache DELETE");
                }
                deleted > 0
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Cache delete error");
                false
            }
        }
    }

    /// Delete every key matching the glob `pattern` using a cursor scan.
    /// Returns the number of keys deleted.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let Some(backend) = self.backend.as_deref() else {
            return 0;
        };

        let mut deleted = 0;
        let mut cursor = 0;
        loop {
            let (next, keys) = match backend.scan(cursor, pattern, self.scan_count).await {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!(pattern, error = %e, "Cache invalidate error");
                    return deleted;
                }
            };

            if !keys.is_empty() {
                match backend.delete(&keys).await {
                    Ok(n) => deleted += n,
                    Err(e) => {
                        tracing::error!(pattern, error = %e, "Cache invalidate error");
                        return deleted;
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        if deleted > 0 {
            tracing::info!(name: "cache.invalidated", pattern, deleted, "Cache INVALIDATE");
        }
        deleted
    }

    /// Drop every cached result under the namespace.
    pub async fn clear_all(&self) -> u64 {
        self.invalidate_pattern(&format!("{}*", self.namespace)).await
    }

    /// Pre-populate the cache without clobbering fresher entries.
    /// Returns how many entries were actually written.
    pub async fn warm(&self, entries: &[WarmEntry]) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        let mut written = 0;
        for entry in entries {
            let key = self.cache_key(&entry.method, &entry.args, &entry.kwargs);
            let ttl = entry.ttl.map(Duration::from_secs);
            if self.set(&key, &entry.result, ttl, true).await {
                written += 1;
            }
        }

        tracing::info!(
            name: "cache.warmed",
            written,
            requested = entries.len(),
            "Cache warming complete"
        );
        written
    }

    async fn count_keys(&self, backend: &dyn CacheBackend) -> anyhow::Result<u64> {
        let pattern = format!("{}*", self.namespace);
        let mut total = 0u64;
        let mut cursor = 0;
        loop {
            let (next, keys) = backend.scan(cursor, &pattern, self.scan_count).await?;
            total += keys.len() as u64;
            if next == 0 {
                return Ok(total);
            }
            cursor = next;
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let default_ttl_seconds = self.default_ttl.as_secs();
        let Some(backend) = self.backend.as_deref() else {
            return CacheStats {
                enabled: false,
                default_ttl_seconds,
                error: Some("Cache store not connected".to_string()),
                ..CacheStats::default()
            };
        };

        let collected = async {
            let hits = backend.read_counter(HITS_KEY).await?;
            let misses = backend.read_counter(MISSES_KEY).await?;
            let keys = self.count_keys(backend).await?;
            let memory = backend.memory_usage().await?;
            anyhow::Ok((hits, misses, keys, memory))
        }
        .await;

        match collected {
            Ok((hits, misses, cache_size_keys, memory)) => {
                let hits = u64::try_from(hits).unwrap_or(0);
                let misses = u64::try_from(misses).unwrap_or(0);
                let total_requests = hits + misses;
                #[allow(clippy::cast_precision_loss)]
                let hit_rate = if total_requests > 0 {
                    hits as f64 / total_requests as f64 * 100.0
                } else {
                    0.0
                };
                #[allow(clippy::cast_precision_loss)]
                let memory_mb = memory.map(|bytes| round2(bytes as f64 / (1024.0 * 1024.0)));

                CacheStats {
                    enabled: true,
                    hits,
                    misses,
                    total_requests,
                    hit_rate_percent: round2(hit_rate),
                    cache_size_keys,
                    memory_mb,
                    default_ttl_seconds,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error getting cache stats");
                CacheStats {
                    enabled: true,
                    default_ttl_seconds,
                    error: Some(e.to_string()),
                    ..CacheStats::default()
                }
            }
        }
    }

    /// Zero the hit/miss counters.
    pub async fn reset_stats(&self) {
        let Some(backend) = self.backend.as_deref() else {
            return;
        };
        for counter in [HITS_KEY, MISSES_KEY] {
            if let Err(e) = backend.write_counter(counter, 0).await {
                tracing::error!(counter, error = %e, "Error resetting cache stats");
                return;
            }
        }
        tracing::info!("Cache statistics reset");
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
