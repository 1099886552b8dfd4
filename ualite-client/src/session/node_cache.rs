// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A bounded cache of node metadata: recently read attributes and browsed
//! references, keyed by node id, with least-recently-used eviction and a time to
//! live. Callers decide what to put in it; nothing here talks to the server.

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use ualite_types::{DataValue, NodeId, ReferenceDescription};

/// Cached metadata for one node.
#[derive(Debug, Clone, Default)]
pub struct NodeCacheEntry {
    /// Attribute values by attribute id.
    pub attributes: HashMap<u32, DataValue>,
    /// References from a browse, when one was cached.
    pub references: Option<Vec<ReferenceDescription>>,
}

impl NodeCacheEntry {
    /// An entry holding a single attribute value.
    pub fn with_attribute(attribute_id: u32, value: DataValue) -> NodeCacheEntry {
        let mut attributes = HashMap::new();
        attributes.insert(attribute_id, value);
        NodeCacheEntry {
            attributes,
            references: None,
        }
    }
}

/// Running statistics of a [`NodeCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeCacheStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub misses: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Entries currently held.
    pub size: usize,
}

impl NodeCacheStats {
    /// Hits as a fraction of all lookups, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CachedNode {
    entry: NodeCacheEntry,
    inserted_at: Instant,
    ttl: Duration,
    last_access: u64,
}

type ClockFn = dyn Fn() -> Instant + Send + Sync;

/// The cache itself. Not internally synchronized; the session wraps it in a mutex.
pub struct NodeCache {
    map: HashMap<NodeId, CachedNode>,
    max_size: usize,
    default_ttl: Duration,
    /// Monotonic access counter establishing recency order.
    tick: u64,
    stats: NodeCacheStats,
    clock: Box<ClockFn>,
}

impl NodeCache {
    /// Create a cache of at most `max_size` entries, each living for
    /// `default_ttl` after insertion. `max_size` must be non-zero.
    pub fn new(max_size: usize, default_ttl: Duration) -> NodeCache {
        Self::new_with_clock(max_size, default_ttl, Box::new(Instant::now))
    }

    /// As [`NodeCache::new`] with an injected clock, for deterministic expiry in
    /// tests.
    pub fn new_with_clock(
        max_size: usize,
        default_ttl: Duration,
        clock: Box<ClockFn>,
    ) -> NodeCache {
        assert!(max_size > 0, "the cache must hold at least one entry");
        NodeCache {
            map: HashMap::with_capacity(max_size),
            max_size,
            default_ttl,
            tick: 0,
            stats: NodeCacheStats::default(),
            clock,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a node. A hit refreshes the entry's recency; an expired entry is
    /// removed and reported as a miss.
    pub fn get(&mut self, node_id: &NodeId) -> Option<&NodeCacheEntry> {
        let now = (self.clock)();
        let expired = match self.map.get(node_id) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(cached) => now.duration_since(cached.inserted_at) > cached.ttl,
        };
        if expired {
            self.map.remove(node_id);
            self.stats.misses += 1;
            self.stats.size = self.map.len();
            return None;
        }
        self.stats.hits += 1;
        let tick = self.next_tick();
        let cached = self.map.get_mut(node_id)?;
        cached.last_access = tick;
        Some(&cached.entry)
    }

    /// Insert or replace an entry with the default time to live.
    pub fn set(&mut self, node_id: NodeId, entry: NodeCacheEntry) {
        self.set_with_ttl(node_id, entry, self.default_ttl)
    }

    /// Insert or replace an entry with an explicit time to live.
    pub fn set_with_ttl(&mut self, node_id: NodeId, entry: NodeCacheEntry, ttl: Duration) {
        let now = (self.clock)();
        let tick = self.next_tick();
        // Make room first so the new entry cannot evict itself
        if !self.map.contains_key(&node_id) && self.map.len() >= self.max_size {
            self.evict_least_recently_used();
        }
        self.map.insert(
            node_id,
            CachedNode {
                entry,
                inserted_at: now,
                ttl,
                last_access: tick,
            },
        );
        self.stats.size = self.map.len();
    }

    fn evict_least_recently_used(&mut self) {
        let Some(oldest) = self
            .map
            .iter()
            .min_by_key(|(_, cached)| cached.last_access)
            .map(|(node_id, _)| node_id.clone())
        else {
            return;
        };
        self.map.remove(&oldest);
        self.stats.evictions += 1;
    }

    /// Remove one entry.
    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeCacheEntry> {
        let removed = self.map.remove(node_id).map(|cached| cached.entry);
        self.stats.size = self.map.len();
        removed
    }

    /// Remove every expired entry, returning how many went.
    pub fn evict_expired(&mut self) -> usize {
        let now = (self.clock)();
        let before = self.map.len();
        self.map
            .retain(|_, cached| now.duration_since(cached.inserted_at) <= cached.ttl);
        let evicted = before - self.map.len();
        self.stats.size = self.map.len();
        evicted
    }

    /// Drop everything. Statistics are kept.
    pub fn clear(&mut self) {
        self.map.clear();
        self.stats.size = 0;
    }

    /// Current statistics.
    pub fn stats(&self) -> NodeCacheStats {
        self.stats
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use ualite_types::Variant;

    fn entry(v: i32) -> NodeCacheEntry {
        NodeCacheEntry::with_attribute(13, DataValue::from(Variant::from(v)))
    }

    /// A clock whose now() the test can move forward.
    fn test_clock() -> (Arc<Mutex<Instant>>, Box<ClockFn>) {
        let now = Arc::new(Mutex::new(Instant::now()));
        let clock_now = now.clone();
        (now, Box::new(move || *clock_now.lock().unwrap()))
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let mut cache = NodeCache::new(3, Duration::from_secs(60));
        cache.set(NodeId::ns0(1), entry(1));
        cache.set(NodeId::ns0(2), entry(2));
        cache.set(NodeId::ns0(3), entry(3));
        // Touch 1 so 2 becomes the least recently used
        assert!(cache.get(&NodeId::ns0(1)).is_some());
        cache.set(NodeId::ns0(4), entry(4));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&NodeId::ns0(2)).is_none());
        assert!(cache.get(&NodeId::ns0(1)).is_some());
        assert!(cache.get(&NodeId::ns0(4)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn many_insertions_stay_bounded() {
        let mut cache = NodeCache::new(10, Duration::from_secs(60));
        for i in 0..100u32 {
            cache.set(NodeId::ns0(i), entry(i as i32));
        }
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.stats().evictions, 90);
        // The newest entries survive
        for i in 90..100u32 {
            assert!(cache.get(&NodeId::ns0(i)).is_some());
        }
    }

    #[test]
    fn expiry_is_a_miss_and_removes() {
        let (now, clock) = test_clock();
        let mut cache = NodeCache::new_with_clock(10, Duration::from_secs(5), clock);
        cache.set(NodeId::ns0(1), entry(1));
        assert!(cache.get(&NodeId::ns0(1)).is_some());

        *now.lock().unwrap() += Duration::from_secs(6);
        assert!(cache.get(&NodeId::ns0(1)).is_none());
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn evict_expired_sweeps() {
        let (now, clock) = test_clock();
        let mut cache = NodeCache::new_with_clock(10, Duration::from_secs(5), clock);
        cache.set(NodeId::ns0(1), entry(1));
        cache.set_with_ttl(NodeId::ns0(2), entry(2), Duration::from_secs(60));
        *now.lock().unwrap() += Duration::from_secs(10);
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&NodeId::ns0(2)).is_some());
    }

    #[test]
    fn hit_rate() {
        let mut cache = NodeCache::new(4, Duration::from_secs(60));
        cache.set(NodeId::ns0(1), entry(1));
        assert!(cache.get(&NodeId::ns0(1)).is_some());
        assert!(cache.get(&NodeId::ns0(2)).is_none());
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn clear_keeps_statistics() {
        let mut cache = NodeCache::new(4, Duration::from_secs(60));
        cache.set(NodeId::ns0(1), entry(1));
        let _ = cache.get(&NodeId::ns0(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}
