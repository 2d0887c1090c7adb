//! Page Cache - byte-budgeted LRU cache of raw pages
//!
//! **Purpose**: Skip stream reads for hot pages of a disk tree
//!
//! **Keying**: byte offset in the backing stream, so the cache is agnostic
//! of page ids, tombstones and header fields alike
//!
//! **Memory**: bounded by bytes, not entries. Every entry is charged
//! `ENTRY_OVERHEAD + len` rounded up to `SIZE_GRANULARITY`.

use lru::LruCache;

/// Bookkeeping charged per entry on top of its payload
pub const ENTRY_OVERHEAD: u64 = 104;

/// Payload lengths are rounded up to this many bytes
pub const SIZE_GRANULARITY: u64 = 8;

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that fell through to the stream
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries too large to ever fit the budget
    pub rejected: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of page bytes with a memory budget
pub struct PageCache {
    /// offset -> payload, most recently used last
    entries: LruCache<u64, Box<[u8]>>,

    /// Byte budget
    budget: u64,

    /// Sum of entry costs currently held
    used: u64,

    stats: CacheStats,
}

impl PageCache {
    /// Create an empty cache holding at most `budget` bytes of entry cost
    pub fn new(budget: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            budget,
            used: 0,
            stats: CacheStats::default(),
        }
    }

    /// Memory charged for a payload of `len` bytes
    #[inline]
    pub fn entry_cost(len: usize) -> u64 {
        let len = len as u64;
        ENTRY_OVERHEAD + len.div_ceil(SIZE_GRANULARITY) * SIZE_GRANULARITY
    }

    /// Copy the entry at `offset` into `buf`
    ///
    /// A hit promotes the entry. An entry longer than `buf` counts as a miss
    /// and keeps its position.
    pub fn try_get(&mut self, offset: u64, buf: &mut [u8]) -> bool {
        let delivered = match self.entries.peek(&offset) {
            Some(bytes) if bytes.len() <= buf.len() => {
                buf[..bytes.len()].copy_from_slice(bytes);
                true
            }
            _ => false,
        };

        if delivered {
            self.entries.promote(&offset);
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        delivered
    }

    /// Store a copy of `bytes` at `offset`, evicting LRU entries to fit
    ///
    /// Any previous entry at `offset` is dropped first. Returns `false` when
    /// the entry alone exceeds the budget and was not cached.
    pub fn set(&mut self, offset: u64, bytes: &[u8]) -> bool {
        self.remove(offset);

        let cost = Self::entry_cost(bytes.len());
        if cost > self.budget {
            self.stats.rejected += 1;
            tracing::trace!(offset, cost, budget = self.budget, "page too large for cache");
            return false;
        }

        while self.used + cost > self.budget {
            match self.entries.pop_lru() {
                Some((evicted_offset, evicted)) => {
                    tracing::trace!(offset = evicted_offset, "evicted page");
                    self.used -= Self::entry_cost(evicted.len());
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }

        self.entries.push(offset, bytes.into());
        self.used += cost;
        true
    }

    /// Drop the entry at `offset`
    pub fn remove(&mut self, offset: u64) -> bool {
        match self.entries.pop(&offset) {
            Some(old) => {
                self.used -= Self::entry_cost(old.len());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.entries.contains(&offset)
    }

    /// Drop every entry; statistics are kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total cost of the entries held
    pub fn memory_used(&self) -> u64 {
        self.used
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}
