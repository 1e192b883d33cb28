//! Fixed-budget arena LRU cache for decoded thumbnails, grounded in
//! spec section 4.4.4 and the "Cyclic and aliased pointer graphs" design
//! note: a single growable byte slab holds every cached thumbnail, and
//! entries reference it by integer offset rather than by pointer, so the
//! slab can be compacted (memmove + offset patch) without invalidating
//! anything outside this module.

use std::collections::HashMap;

use crate::error::DupError;
use crate::oid::Oid;

struct Entry {
    oid: Oid,
    offset: usize,
    length: usize,
    pins: u32,
}

#[derive(Default, Clone, Debug)]
pub struct Stats {
    pub lookups: u64,
    pub reads: u64,
    pub pair_comparisons: u64,
    pub duplicates: u64,
    pub shrinks: u64,
    pub allocated_bytes: u64,
}

/// A handle returned by `ThumbnailCache::lock`; call `unlock` with it when
/// done so the entry becomes evictable again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot(usize);

pub struct ThumbnailCache {
    slab: Vec<u8>,
    capacity: usize,
    entries: Vec<Option<Entry>>,
    index: HashMap<Oid, usize>,
    /// Most-recently-used first.
    lru: Vec<usize>,
    stats: Stats,
}

impl ThumbnailCache {
    pub fn new(capacity: usize) -> Self {
        ThumbnailCache {
            slab: Vec::new(),
            capacity,
            entries: Vec::new(),
            index: HashMap::new(),
            lru: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn used_bytes(&self) -> usize {
        self.entries.iter().flatten().map(|e| e.length).sum()
    }

    /// Looks up `oid`, decoding via `load` on a miss, and pins the result
    /// so it survives eviction until `unlock` is called.
    pub fn lock(&mut self, oid: Oid, load: impl FnOnce() -> Vec<u8>) -> Result<Slot, DupError> {
        self.stats.lookups += 1;
        if let Some(&slot) = self.index.get(&oid) {
            self.entries[slot].as_mut().unwrap().pins += 1;
            self.touch(slot);
            return Ok(Slot(slot));
        }
        self.stats.reads += 1;
        let data = load();
        self.insert(oid, data)
    }

    pub fn unlock(&mut self, slot: Slot) {
        if let Some(e) = self.entries[slot.0].as_mut() {
            e.pins = e.pins.saturating_sub(1);
        }
    }

    pub fn bytes(&self, slot: Slot) -> &[u8] {
        let e = self.entries[slot.0].as_ref().expect("stale slot");
        &self.slab[e.offset..e.offset + e.length]
    }

    pub fn note_pair_comparison(&mut self) {
        self.stats.pair_comparisons += 1;
    }

    pub fn note_duplicate(&mut self) {
        self.stats.duplicates += 1;
    }

    fn touch(&mut self, slot: usize) {
        if let Some(pos) = self.lru.iter().position(|&s| s == slot) {
            self.lru.remove(pos);
        }
        self.lru.insert(0, slot);
    }

    fn insert(&mut self, oid: Oid, data: Vec<u8>) -> Result<Slot, DupError> {
        let needed = data.len();
        if needed > self.capacity {
            return Err(DupError::CacheFull);
        }
        if self.used_bytes() + needed > self.capacity {
            self.evict_until_half_full()?;
        }
        self.compact();

        let offset = self.slab.len();
        self.slab.extend_from_slice(&data);
        let slot = self.entries.len();
        self.entries.push(Some(Entry { oid, offset, length: needed, pins: 1 }));
        self.index.insert(oid, slot);
        self.lru.insert(0, slot);
        self.stats.allocated_bytes = self.slab.len() as u64;
        Ok(Slot(slot))
    }

    /// Evicts least-recently-used unpinned entries until usage drops to
    /// half capacity, amortizing the cost of the compaction that follows
    /// across many future insertions rather than compacting after every
    /// single eviction.
    fn evict_until_half_full(&mut self) -> Result<(), DupError> {
        let target = self.capacity / 2;
        while self.used_bytes() > target {
            let victim = self
                .lru
                .iter()
                .rev()
                .copied()
                .find(|&s| self.entries[s].as_ref().map_or(false, |e| e.pins == 0));
            match victim {
                Some(slot) => {
                    let oid = self.entries[slot].as_ref().unwrap().oid;
                    self.entries[slot] = None;
                    self.index.remove(&oid);
                    self.lru.retain(|&s| s != slot);
                    self.stats.shrinks += 1;
                }
                None => return Err(DupError::CacheFull),
            }
        }
        Ok(())
    }

    /// Rewrites the slab, dropping tombstoned entries and patching every
    /// surviving entry's offset, grounded in the design note's memmove +
    /// offset-patch description of compaction.
    fn compact(&mut self) {
        let mut new_slab = Vec::with_capacity(self.used_bytes());
        for slot in &self.lru {
            if let Some(e) = self.entries[*slot].as_mut() {
                let new_offset = new_slab.len();
                new_slab.extend_from_slice(&self.slab[e.offset..e.offset + e.length]);
                e.offset = new_offset;
            }
        }
        self.slab = new_slab;
        self.stats.allocated_bytes = self.slab.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_and_unlock_round_trips_bytes() {
        let mut cache = ThumbnailCache::new(1024);
        let slot = cache.lock(1, || vec![1, 2, 3, 4]).unwrap();
        assert_eq!(cache.bytes(slot), &[1, 2, 3, 4]);
        cache.unlock(slot);
    }

    #[test]
    fn cache_hit_skips_loader() {
        let mut cache = ThumbnailCache::new(1024);
        let slot1 = cache.lock(5, || vec![9; 16]).unwrap();
        cache.unlock(slot1);
        let mut loader_called = false;
        let slot2 = cache
            .lock(5, || {
                loader_called = true;
                vec![0; 16]
            })
            .unwrap();
        assert!(!loader_called);
        assert_eq!(cache.bytes(slot2), &[9; 16]);
        assert_eq!(cache.stats().reads, 1);
        assert_eq!(cache.stats().lookups, 2);
    }

    #[test]
    fn eviction_makes_room_for_new_entries() {
        let mut cache = ThumbnailCache::new(100);
        for oid in 0..20u32 {
            let slot = cache.lock(oid, || vec![7u8; 10]).unwrap();
            cache.unlock(slot);
        }
        assert!(cache.used_bytes() <= 100);
        assert!(cache.stats().shrinks > 0);
    }

    #[test]
    fn pinned_entries_survive_eviction_pressure() {
        let mut cache = ThumbnailCache::new(50);
        let pinned = cache.lock(1, || vec![1u8; 20]).unwrap();
        for oid in 2..10u32 {
            let slot = cache.lock(oid, || vec![2u8; 10]).unwrap();
            cache.unlock(slot);
        }
        assert_eq!(cache.bytes(pinned), &[1u8; 20]);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let mut cache = ThumbnailCache::new(16);
        let result = cache.lock(1, || vec![0u8; 32]);
        assert!(matches!(result, Err(DupError::CacheFull)));
    }
}
