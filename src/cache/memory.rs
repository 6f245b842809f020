//! In-process cache backend.
//!
//! Mirrors the subset of Redis semantics the query cache relies on: TTL expiry,
//! conditional writes, atomic counters, and cursor-based glob scans.

use super::backend::CacheBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Cursors {
    next_id: u64,
    /// Last key examined by each open scan.
    resume_after: HashMap<u64, String>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Entry>>,
    cursors: Mutex<Cursors>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Translate a Redis glob (`*`, `?`, `[...]`, `\` escapes) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    match inner {
                        '\\' | '[' | '&' | '~' => {
                            out.push('\\');
                            out.push(inner);
                        }
                        _ => out.push(inner),
                    }
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).with_context(|| format!("Invalid key pattern: {pattern}"))
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        only_if_absent: bool,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if only_if_absent && entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if entries.remove(key).is_some_and(|e| e.is_live(now)) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Cursors are opaque and resume after the last key examined, so keys
    /// deleted between calls never shift the remainder of the scan.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let matcher = glob_to_regex(pattern)?;
        let mut cursors = self.cursors.lock().await;

        let lower = if cursor == 0 {
            Bound::Unbounded
        } else {
            match cursors.resume_after.remove(&cursor) {
                Some(last) => Bound::Excluded(last),
                None => return Ok((0, Vec::new())),
            }
        };

        let entries = self.entries.lock().await;
        let now = Instant::now();
        let batch = count.max(1);
        let examined: Vec<(&String, &Entry)> = entries
            .range::<String, _>((lower, Bound::Unbounded))
            .take(batch)
            .collect();

        let matched = examined
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key))
            .map(|(key, _)| key.to_string())
            .collect();

        let last = match examined.last() {
            Some((key, _)) if examined.len() == batch => key.to_string(),
            _ => return Ok((0, matched)),
        };
        let more = entries
            .range::<String, _>((Bound::Excluded(&last), Bound::Unbounded))
            .next()
            .is_some();
        if !more {
            return Ok((0, matched));
        }

        cursors.next_id += 1;
        let next_cursor = cursors.next_id;
        cursors.resume_after.insert(next_cursor, last);
        Ok((next_cursor, matched))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let current: i64 = entry
            .value
            .parse()
            .with_context(|| format!("Value at {key} is not an integer"))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn read_counter(&self, key: &str) -> Result<i64> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => Ok(entry.value.parse()?),
            None => Ok(0),
        }
    }

    async fn write_counter(&self, key: &str, value: i64) -> Result<()> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn memory_usage(&self) -> Result<Option<u64>> {
        let entries = self.entries.lock().await;
        let bytes: usize = entries.iter().map(|(k, e)| k.len() + e.value.len()).sum();
        Ok(Some(u64::try_from(bytes).unwrap_or(u64::MAX)))
    }
}
