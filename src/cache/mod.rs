//! Response Cache (spec §4.2): bounded LRU with TTL, used as the T3 fallback
//! tier for LLM calls. Process-local, single-writer under a lock per the
//! concurrency model in spec §5.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use twox_hash::XxHash64;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    /// Strictly increasing sequence number; the smallest value among live
    /// entries is the oldest-by-insertion-time one, giving O(1) LRU eviction
    /// without a doubly-linked list.
    sequence: u64,
}

pub struct ResponseCache<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
    ttl: Duration,
}

struct Inner<V> {
    entries: HashMap<u64, Entry<V>>,
    next_sequence: u64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
            max_size,
            ttl,
        }
    }

    /// Hashes `fn_name` plus the first 500 characters of `input` with a fast
    /// non-cryptographic hash, per spec §4.2.
    pub fn key(fn_name: &str, input: &str) -> u64 {
        let truncated: String = input.chars().take(500).collect();
        let mut hasher = XxHash64::with_seed(0);
        fn_name.hash(&mut hasher);
        truncated.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the cached value if present and not expired, re-inserting it to
    /// mark recency. Expired entries are deleted and counted as a miss.
    pub async fn get(&self, key: u64) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let expired = inner
            .entries
            .get(&key)
            .map(|e| e.expires_at <= now)
            .unwrap_or(false);
        if expired {
            inner.entries.remove(&key);
            return None;
        }

        let value = inner.entries.get(&key).map(|e| e.value.clone())?;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.sequence = sequence;
        }
        Some(value)
    }

    /// Inserts `value` under `key`, evicting the oldest-by-insertion-time entry
    /// if at capacity.
    pub async fn put(&self, key: u64, value: V) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let ttl = self.ttl;
        let max_size = self.max_size;

        if inner.entries.len() >= max_size && !inner.entries.contains_key(&key) {
            if let Some((&oldest_key, _)) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
            {
                inner.entries.remove(&oldest_key);
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
                sequence,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evicts_oldest_by_insertion_when_full() {
        let cache = ResponseCache::new(2, Duration::from_secs(3600));
        cache.put(1, "a").await;
        cache.put(2, "b").await;
        cache.put(3, "c").await;

        assert!(cache.get(1).await.is_none());
        assert_eq!(cache.get(2).await, Some("b"));
        assert_eq!(cache.get(3).await, Some("c"));
    }

    #[tokio::test]
    async fn hit_then_insert_evicts_second_oldest() {
        let cache = ResponseCache::new(2, Duration::from_secs(3600));
        cache.put(1, "a").await;
        cache.put(2, "b").await;

        // Touch key 1 so it is no longer the oldest.
        assert_eq!(cache.get(1).await, Some("a"));

        cache.put(3, "c").await;

        assert_eq!(cache.get(1).await, Some("a"));
        assert!(cache.get(2).await.is_none());
        assert_eq!(cache.get(3).await, Some("c"));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = ResponseCache::new(10, Duration::from_millis(5));
        cache.put(1, "a").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(1).await.is_none());
    }

    #[test]
    fn key_is_stable_for_same_input() {
        let a = ResponseCache::<()>::key("analyze", "hello world");
        let b = ResponseCache::<()>::key("analyze", "hello world");
        let c = ResponseCache::<()>::key("analyze", "hello mars");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
