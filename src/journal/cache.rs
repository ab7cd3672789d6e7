use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::core::types::{BlockIndex, Document};

/// Recency cache over loaded blocks, used by the journal to serve repeat
/// single-block reads without touching the store.
///
/// Entries age out: a lookup older than `max_age` drops the entry and
/// reports a miss.
#[derive(Debug)]
pub struct BlockCache {
    cache: LruCache<BlockIndex, (Document, Instant)>,
    capacity: usize,
    max_age: Duration,
    hit_count: usize,
    miss_count: usize,
}

impl BlockCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BlockCache {
            cache: LruCache::new(cap),
            capacity,
            max_age,
            hit_count: 0,
            miss_count: 0,
        }
    }

    pub fn get(&mut self, addr: BlockIndex) -> Option<Document> {
        if let Some((doc, stored)) = self.cache.get(&addr) {
            if stored.elapsed() <= self.max_age {
                self.hit_count += 1;
                return Some(doc.clone());
            }
        } else {
            self.miss_count += 1;
            return None;
        }
        // present but past its age limit: drop it and report a miss
        self.cache.pop(&addr);
        self.miss_count += 1;
        None
    }

    /// Presence check that neither bumps recency nor counts a hit.
    pub fn contains(&self, addr: BlockIndex) -> bool {
        match self.cache.peek(&addr) {
            Some((_, stored)) => stored.elapsed() <= self.max_age,
            None => false,
        }
    }

    pub fn put(&mut self, addr: BlockIndex, doc: Document) {
        self.cache.put(addr, (doc, Instant::now()));
    }

    pub fn evict(&mut self, addr: BlockIndex) -> bool {
        self.cache.pop(&addr).is_some()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            size: self.cache.len(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
