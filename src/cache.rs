//! Byte-budgeted LRU cache of decoded tile payloads.
//!
//! Payload cost is bytes, not entry count (a decoded tile texture can be
//! anywhere from a few KB to tens of MB, so a count-based cap (as in
//! `lru::LruCache` used bare) doesn't track the real constraint). This
//! wraps [`lru::LruCache`] for its recency ordering and enforces the byte
//! budget on top of it, the same way the cache wraps `lru` elsewhere in
//! this crate's lineage, generalized from a fixed-count cache to one keyed
//! on decoded size.

use std::num::NonZeroUsize;

use lru::LruCache;

/// One cached payload plus its accounting metadata.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    size_bytes: usize,
    generation: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A byte-budgeted LRU keyed by canonical tile key, generic over the
/// decoded payload type `T`.
pub struct TileCache<T> {
    entries: LruCache<String, CacheEntry<T>>,
    max_bytes: usize,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T: Clone> TileCache<T> {
    /// Builds a cache with a `max_size_mb` budget (converted as `* 2^20`).
    pub fn new(max_size_mb: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(usize::MAX).unwrap()),
            max_bytes: max_size_mb * (1 << 20),
            total_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns a clone of the cached payload, marking it as most recently
    /// used, or `None` on a miss.
    pub fn get(&mut self, key: &str) -> Option<T> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.payload.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Checks presence without affecting recency or hit/miss counters.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Inserts or replaces `key`, then evicts least-recently-used entries
    /// until the budget is satisfied (a single oversized entry is allowed
    /// to remain alone).
    pub fn set(&mut self, key: &str, payload: T, size_bytes: usize, generation: u64) {
        if let Some(old) = self.entries.pop(key) {
            self.total_bytes -= old.size_bytes;
        }
        self.entries.put(key.to_string(), CacheEntry { payload, size_bytes, generation });
        self.total_bytes += size_bytes;

        while self.total_bytes > self.max_bytes && self.entries.len() > 1 {
            if let Some((_, evicted)) = self.entries.pop_lru() {
                self.total_bytes -= evicted.size_bytes;
                self.evictions += 1;
            } else {
                break;
            }
        }
    }

    pub fn delete(&mut self, key: &str) {
        if let Some(entry) = self.entries.pop(key) {
            self.total_bytes -= entry.size_bytes;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    /// Drops every entry tagged with a generation older than `current`.
    pub fn invalidate_old_generations(&mut self, current: u64) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.generation < current)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            self.delete(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes,
            max_bytes: self.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

/// Default size estimator: returns a flat 1 MiB for any payload. Intended
/// to be overridden by [`crate::loader::TileLoaderConfig::size_estimator`].
pub fn default_estimate_size<T>(_payload: &T) -> usize {
    1 << 20
}

/// `width * height * bytes_per_pixel`, for texture-shaped payloads.
pub fn calculate_texture_size(width: u32, height: u32, bytes_per_pixel: u32) -> usize {
    width as usize * height as usize * bytes_per_pixel as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_picks_lru_victim() {
        let mut cache: TileCache<Vec<u8>> = TileCache::new(1); // 1 MiB budget
        let payload = |n: usize| vec![0u8; n];

        cache.set("0/0/0", payload(400_000), 400_000, 0);
        cache.set("0/0/1", payload(400_000), 400_000, 0);
        // Crosses the budget (1_200_000 > 1_048_576): eviction is eager, so
        // the LRU entry (0/0/0) is gone before anyone gets a chance to
        // touch it.
        cache.set("0/0/2", payload(400_000), 400_000, 0);
        assert!(!cache.has("0/0/0"));

        // Same story again: 0/0/1 is now the LRU entry and is evicted.
        cache.set("0/0/3", payload(400_000), 400_000, 0);

        let stats = cache.stats();
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 800_000);
        assert!(!cache.has("0/0/0"));
        assert!(!cache.has("0/0/1"));
        assert!(cache.has("0/0/2"));
        assert!(cache.has("0/0/3"));
    }

    #[test]
    fn single_oversized_entry_permitted() {
        let mut cache: TileCache<Vec<u8>> = TileCache::new(1);
        cache.set("0/0/0", vec![0u8; 5_000_000], 5_000_000, 0);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn invalidate_old_generations_drops_stale_entries() {
        let mut cache: TileCache<Vec<u8>> = TileCache::new(50);
        cache.set("5/3/4", vec![1, 2, 3], 3, 0);
        cache.invalidate_old_generations(1);
        assert!(!cache.has("5/3/4"));
    }

    #[test]
    fn size_accounting_matches_sum_of_entries() {
        let mut cache: TileCache<Vec<u8>> = TileCache::new(50);
        cache.set("0/0/0", vec![0u8; 100], 100, 0);
        cache.set("0/0/1", vec![0u8; 200], 200, 0);
        assert_eq!(cache.stats().total_bytes, 300);
    }
}
