//! Integration tests for the query cache.
//!
//! The in-memory backend tests always run. The Redis tests require
//! `REDIS_TEST_URL` (e.g. `redis://localhost:6379/15`) and are skipped
//! otherwise. They use a random namespace so they never touch real entries.

use graph_retriever::cache::{CacheBackend, MemoryBackend, QueryCache, RedisBackend, WarmEntry};
use graph_retriever::config::CacheConfig;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Test Utilities
// =============================================================================

fn get_redis_url() -> Option<String> {
    std::env::var("REDIS_TEST_URL").ok()
}

fn test_config(url: &str) -> CacheConfig {
    CacheConfig {
        url: url.to_string(),
        namespace: format!("test:{}:", &Uuid::new_v4().to_string()[..8]),
        scan_count: 10,
        ..CacheConfig::default()
    }
}

fn memory_cache() -> QueryCache {
    QueryCache::with_backend(Arc::new(MemoryBackend::new()), &CacheConfig::default())
}

// =============================================================================
// In-memory backend
// =============================================================================

#[tokio::test]
async fn test_concurrent_counters_are_consistent() {
    let cache = Arc::new(memory_cache());
    cache.set("graph:query:hot", &json!("value"), None, false).await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let key = if i % 2 == 0 {
                "graph:query:hot".to_string()
            } else {
                format!("graph:query:cold:{i}")
            };
            cache.get::<Value>(&key).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 25);
    assert_eq!(stats.misses, 25);
    assert_eq!(stats.total_requests, 50);
    assert!((stats.hit_rate_percent - 50.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let cache = memory_cache();
    cache
        .set("graph:query:k", &json!(1), Some(Duration::from_secs(300)), false)
        .await;

    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(cache.get::<Value>("graph:query:k").await, Some(json!(1)));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get::<Value>("graph:query:k").await, None);
}

#[tokio::test]
async fn test_warm_then_lookup_by_derived_key() {
    let cache = memory_cache();
    let mut kwargs = Map::new();
    kwargs.insert("top_k".into(), json!(5));
    kwargs.insert("max_depth".into(), json!(3));

    let written = cache
        .warm(&[WarmEntry {
            method: "run".into(),
            args: vec![json!("Student visa")],
            kwargs: kwargs.clone(),
            result: json!({"documents": [], "graph_paths": []}),
            ttl: None,
        }])
        .await;
    assert_eq!(written, 1);

    // Keyword order does not matter
    let mut reordered = Map::new();
    reordered.insert("max_depth".into(), json!(3));
    reordered.insert("top_k".into(), json!(5));
    let key = cache.cache_key("run", &[json!("Student visa")], &reordered);
    assert_eq!(
        cache.get::<Value>(&key).await,
        Some(json!({"documents": [], "graph_paths": []}))
    );
}

// =============================================================================
// Redis backend (requires REDIS_TEST_URL)
// =============================================================================

#[tokio::test]
async fn test_redis_round_trip_and_invalidation() {
    let Some(url) = get_redis_url() else {
        eprintln!("Skipping test: REDIS_TEST_URL not set");
        return;
    };
    let config = test_config(&url);
    let cache = QueryCache::connect(&config).await;
    assert!(cache.is_enabled(), "Redis at {url} should be reachable");

    let ns = config.namespace.clone();
    let key = format!("{ns}run:abc");
    assert!(cache.set(&key, &json!({"a": 1}), Some(Duration::from_secs(300)), false).await);
    assert_eq!(cache.get::<Value>(&key).await, Some(json!({"a": 1})));

    // NX keeps the existing value
    assert!(!cache.set(&key, &json!({"a": 2}), None, true).await);
    assert_eq!(cache.get::<Value>(&key).await, Some(json!({"a": 1})));

    for i in 0..25 {
        cache.set(&format!("{ns}run:{i}"), &i, None, false).await;
    }
    cache.set(&format!("{ns}search:keep"), &1, None, false).await;

    assert_eq!(cache.invalidate_pattern(&format!("{ns}run:*")).await, 26);
    assert_eq!(cache.get::<Value>(&key).await, None);
    assert_eq!(cache.get::<i32>(&format!("{ns}search:keep")).await, Some(1));

    assert!(cache.delete(&format!("{ns}search:keep")).await);
    assert_eq!(cache.clear_all().await, 0);
}

#[tokio::test]
async fn test_redis_stats_report_memory() {
    let Some(url) = get_redis_url() else {
        eprintln!("Skipping test: REDIS_TEST_URL not set");
        return;
    };
    let config = test_config(&url);
    let cache = QueryCache::connect(&config).await;

    cache.set(&format!("{}run:x", config.namespace), &1, None, false).await;
    let stats = cache.stats().await;
    assert!(stats.enabled);
    assert!(stats.error.is_none());
    assert_eq!(stats.cache_size_keys, 1);
    assert!(stats.memory_mb.is_some());

    cache.clear_all().await;
}

#[tokio::test]
async fn test_redis_backend_counters() {
    let Some(url) = get_redis_url() else {
        eprintln!("Skipping test: REDIS_TEST_URL not set");
        return;
    };
    let backend = RedisBackend::connect(&url, Duration::from_secs(2))
        .await
        .expect("Failed to connect to Redis");

    let counter = format!("test:{}:counter", Uuid::new_v4());
    assert_eq!(backend.read_counter(&counter).await.unwrap(), 0);
    assert_eq!(backend.incr(&counter).await.unwrap(), 1);
    assert_eq!(backend.incr(&counter).await.unwrap(), 2);
    backend.write_counter(&counter, 0).await.unwrap();
    assert_eq!(backend.read_counter(&counter).await.unwrap(), 0);
    backend.delete(&[counter]).await.unwrap();
}
