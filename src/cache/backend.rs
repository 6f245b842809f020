use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Shared key-value store underneath [`super::QueryCache`].
///
/// Implementations must be safe for arbitrary concurrent callers; counter
/// updates must be atomic in the store itself.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` with a TTL. With `only_if_absent`, an existing live key is
    /// left untouched and `false` is returned.
    async fn set(&self, key: &str, value: &str, ttl: Duration, only_if_absent: bool)
    -> Result<bool>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// One step of a non-blocking keyspace scan. Returns the next cursor
    /// (0 when the scan is complete) and the keys matching the glob `pattern`.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;

    /// Atomically increment a counter, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn read_counter(&self, key: &str) -> Result<i64>;

    async fn write_counter(&self, key: &str, value: i64) -> Result<()>;

    /// Bytes used by the store, when it reports it.
    async fn memory_usage(&self) -> Result<Option<u64>>;
}
