pub mod key;
pub mod store;
pub mod sweeper;

pub use key::CacheKey;
pub use store::{CacheEntry, MemoryCache};
pub use sweeper::SweepHandle;

use bytes::Bytes;

/// Trait for cache backends
pub trait Cache: Send + Sync {
    /// Get cached data by key; expired entries are reported as absent
    fn get(&self, key: &CacheKey) -> Option<Bytes>;

    /// Store data in cache, resetting its expiry
    fn set(&self, key: CacheKey, data: Bytes);

    /// Remove a single entry
    fn delete(&self, key: &CacheKey);

    /// Remove every entry
    fn clear(&self);

    /// Number of stored entries, including expired ones not yet swept
    fn size(&self) -> usize;
}

/// Generate an ETag from a cache key
pub fn etag_for_key(key: &CacheKey) -> String {
    format!("\"{}\"", key)
}
