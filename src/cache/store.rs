use crate::cache::{Cache, CacheKey};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// A cached payload with its insertion and expiry instants.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(payload: Bytes, ttl: Duration) -> Self {
        let now = Instant::now();
        Self { payload, created_at: now, expires_at: now + ttl }
    }

    /// An entry is valid strictly before `expires_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache with a single process-wide TTL.
///
/// Lookups take the shared side of the lock and never hand out an expired
/// payload; expired entries stay in the map until the next sweep (see
/// [`MemoryCache::sweep_expired`] and [`MemoryCache::start_sweeper`]).
/// There is no entry-count bound, only the TTL limits growth.
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    sweeper_started: AtomicBool,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            sweeper_started: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Removes every expired entry and returns how many were dropped.
    ///
    /// Holds the write lock for the whole scan, so concurrent readers and
    /// writers stall while it runs.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub(crate) fn mark_sweeper_started(&self) -> bool {
        self.sweeper_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_expired_at(Instant::now()) {
            return None;
        }
        Some(entry.payload.clone())
    }

    fn set(&self, key: CacheKey, data: Bytes) {
        let entry = CacheEntry::new(data, self.ttl);
        self.entries.write().insert(key, entry);
    }

    fn delete(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn size(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(s: &str) -> CacheKey {
        CacheKey::from(s)
    }

    #[test]
    fn set_then_get_returns_payload() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set(key("a"), Bytes::from_static(b"payload"));

        assert_eq!(cache.get(&key("a")), Some(Bytes::from_static(b"payload")));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn missing_key_is_absent() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        assert!(cache.get(&key("nope")).is_none());
    }

    #[test]
    fn overwrite_replaces_payload() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set(key("a"), Bytes::from_static(b"one"));
        cache.set(key("a"), Bytes::from_static(b"two"));

        assert_eq!(cache.get(&key("a")), Some(Bytes::from_static(b"two")));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_hidden_but_still_counted() {
        let cache = MemoryCache::new(Duration::from_secs(10));
        cache.set(key("a"), Bytes::from_static(b"v"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get(&key("a")).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_resets_expiry() {
        let cache = MemoryCache::new(Duration::from_secs(10));
        cache.set(key("a"), Bytes::from_static(b"v1"));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set(key("a"), Bytes::from_static(b"v2"));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&key("a")), Some(Bytes::from_static(b"v2")));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = MemoryCache::new(Duration::from_secs(10));
        cache.set(key("old"), Bytes::from_static(b"x"));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.set(key("fresh"), Bytes::from_static(b"y"));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.size(), 1);
        assert!(cache.get(&key("fresh")).is_some());
    }

    #[test]
    fn delete_and_clear() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set(key("a"), Bytes::from_static(b"1"));
        cache.set(key("b"), Bytes::from_static(b"2"));

        cache.delete(&key("a"));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.size(), 1);

        cache.delete(&key("missing"));
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn concurrent_access_keeps_last_write_per_key() {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let own = key(&format!("t{t}-{i}"));
                        cache.set(own.clone(), Bytes::from(format!("{t}:{i}")));
                        assert!(cache.get(&own).is_some());
                        if i % 2 == 0 {
                            cache.delete(&own);
                        }
                        cache.set(key("shared"), Bytes::from(format!("{t}")));
                        let _ = cache.get(&key("shared"));
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        // Odd indices survive in every thread; the shared key holds one thread's write.
        assert_eq!(cache.size(), 8 * 250 + 1);
        assert_eq!(cache.get(&key("t3-7")), Some(Bytes::from("3:7")));
        assert!(cache.get(&key("t3-8")).is_none());
        let shared = cache.get(&key("shared")).unwrap();
        let writer: u32 = std::str::from_utf8(&shared).unwrap().parse().unwrap();
        assert!(writer < 8);
    }
}
