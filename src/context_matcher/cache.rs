use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::MatchResult;

struct Entry {
    result: MatchResult,
    expires_at: Instant,
}

/// 10-minute TTL, FIFO-eviction-at-capacity result cache keyed by canonical
/// URL (spec §4.10 steps 2 and 6). Unlike `ResponseCache`, a read never
/// refreshes recency — eviction order is purely insertion order.
pub struct MatchCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

impl MatchCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), order: VecDeque::new() }),
            capacity,
            ttl,
        }
    }

    /// A hit only if the entry has not expired (spec §4.10 step 2).
    pub async fn get_fresh(&self, key: &str) -> Option<MatchResult> {
        let inner = self.inner.lock().await;
        let entry = inner.entries.get(key)?;
        (entry.expires_at > Instant::now()).then(|| entry.result.clone())
    }

    /// Returns the entry even if expired, for the store-failure fallback
    /// (spec §4.10 step 4: "on store failure, return the stale cache entry
    /// if any, else empty").
    pub async fn get_stale(&self, key: &str) -> Option<MatchResult> {
        let inner = self.inner.lock().await;
        inner.entries.get(key).map(|e| e.result.clone())
    }

    pub async fn put(&self, key: String, result: MatchResult) {
        let mut inner = self.inner.lock().await;
        let ttl = self.ttl;
        let capacity = self.capacity;

        if !inner.entries.contains_key(&key) {
            if inner.entries.len() >= capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
            inner.order.push_back(key.clone());
        }

        inner.entries.insert(key, Entry { result, expires_at: Instant::now() + ttl });
    }

    /// Total entries currently held, expired or not (used for `/api/health`
    /// and `/api/ai-status` cache stats).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MatchResult {
        MatchResult { matched: true, events: Vec::new(), confidence: 0.9 }
    }

    #[tokio::test]
    async fn evicts_in_insertion_order_at_capacity() {
        let cache = MatchCache::new(2, Duration::from_secs(600));
        cache.put("a".to_string(), sample()).await;
        cache.put("b".to_string(), sample()).await;

        // Touching "a" must NOT protect it from eviction (pure FIFO, unlike the LRU response cache).
        let _ = cache.get_fresh("a").await;

        cache.put("c".to_string(), sample()).await;

        assert!(cache.get_fresh("a").await.is_none());
        assert!(cache.get_fresh("b").await.is_some());
        assert!(cache.get_fresh("c").await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_not_fresh_but_is_stale() {
        let cache = MatchCache::new(10, Duration::from_millis(5));
        cache.put("a".to_string(), sample()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get_fresh("a").await.is_none());
        assert!(cache.get_stale("a").await.is_some());
    }
}
