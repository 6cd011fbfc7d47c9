//! Bounded page cache for bsistent.
//!
//! Maps page offsets to the most recently written or read page instance.
//! The pool of slots is preallocated with zero pages and reused in place;
//! eviction prefers slots vacated by [`PageCache::invalidate`] and otherwise
//! advances a round-robin cursor. This is deliberately not LRU: the only
//! contract is bounded size, with hot pages staying reachable between
//! consecutive accesses.

use std::collections::{BTreeSet, HashMap};

/// A pool entry: anything addressed by a file offset.
///
/// Zero pages report offset 0 and are never indexed.
pub trait CacheSlot {
    fn offset(&self) -> u64;
}

/// Bounded associative map from page offset to resident page.
pub struct PageCache<P: CacheSlot + Clone> {
    /// Preallocated page slots, reused in place.
    pool: Vec<P>,
    /// Current offset-to-slot mapping.
    index_of: HashMap<u64, usize>,
    /// Slots vacated by invalidation, preferred for reuse.
    invalidated: BTreeSet<usize>,
    /// Round-robin pointer.
    cursor: usize,
    /// Maximum number of resident pages; 0 disables caching entirely.
    limit: usize,
    /// Zero page cloned into slots on initialization and invalidation.
    zero: P,
}

impl<P: CacheSlot + Clone> PageCache<P> {
    /// Creates a cache of at most `limit` pages, filling the pool with
    /// clones of the `zero` page.
    pub fn new(limit: usize, zero: P) -> Self {
        Self {
            pool: (0..limit).map(|_| zero.clone()).collect(),
            index_of: HashMap::with_capacity(limit),
            invalidated: BTreeSet::new(),
            cursor: 0,
            limit,
            zero,
        }
    }

    /// Returns the cached page for `offset`, if resident.
    pub fn load(&self, offset: u64) -> Option<&P> {
        if self.limit == 0 {
            return None;
        }
        self.index_of.get(&offset).map(|&slot| &self.pool[slot])
    }

    /// Installs `page`, replacing in place when its offset is already
    /// resident and evicting a slot otherwise.
    pub fn save(&mut self, page: P) {
        self.install(page, false);
    }

    /// Replaces the cached copy of `page` only if its offset is already
    /// resident.
    pub fn update(&mut self, page: P) {
        self.install(page, true);
    }

    fn install(&mut self, page: P, update_only: bool) {
        if self.limit == 0 {
            return;
        }
        let offset = page.offset();
        if let Some(&slot) = self.index_of.get(&offset) {
            self.pool[slot] = page;
        } else if !update_only {
            let slot = self.next_index();
            let evicted = self.pool[slot].offset();
            if evicted > 0 {
                self.index_of.remove(&evicted);
            }
            self.pool[slot] = page;
            self.index_of.insert(offset, slot);
        }
    }

    /// Drops the entry for `offset`, resetting its slot to a zero page and
    /// marking the slot for preferred reuse.
    pub fn invalidate(&mut self, offset: u64) {
        if self.limit == 0 {
            return;
        }
        if let Some(slot) = self.index_of.remove(&offset) {
            self.pool[slot] = self.zero.clone();
            self.invalidated.insert(slot);
            if self.index_of.is_empty() {
                self.invalidated.clear();
                self.cursor = 0;
            }
        }
    }

    /// Drops every entry, restoring the cache to its initial state.
    pub fn clear(&mut self) {
        for slot in self.pool.iter_mut() {
            *slot = self.zero.clone();
        }
        self.index_of.clear();
        self.invalidated.clear();
        self.cursor = 0;
    }

    fn next_index(&mut self) -> usize {
        if self.index_of.is_empty() {
            return 0;
        }
        if let Some(&slot) = self.invalidated.iter().next() {
            self.invalidated.remove(&slot);
            return slot;
        }
        self.cursor = (self.cursor + 1) % self.limit;
        self.cursor
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.index_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_of.is_empty()
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.limit
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.index_of.contains_key(&offset)
    }
}
