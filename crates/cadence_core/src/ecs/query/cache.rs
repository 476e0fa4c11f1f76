use super::QuerySignature;
use crate::config::QueryCacheConfig;
use crate::ecs::Entity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    /// Materialized matching entities, ordered by entity index.
    pub entities: Arc<[Entity]>,
    /// Whether the result came from the cache without recomputing.
    pub hit: bool,
}

/// Counters since construction or the last [`QueryCache::clear`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatistics {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub evictions: u64,
    pub version: u64,
}

struct CacheEntry {
    version: u64,
    entities: Arc<[Entity]>,
    last_access: AtomicU64,
}

/// Versioned cache of query results.
///
/// An entry is only served while the version it was computed under equals
/// the current version. [`invalidate`](Self::invalidate) bumps the version
/// and leaves stale entries in place; they are replaced on the next miss or
/// evicted first once the cache is over capacity.
///
/// Recency for eviction comes from a logical access clock rather than wall
/// time, so the hit path is one map read plus two relaxed atomic ops.
pub struct QueryCache {
    config: QueryCacheConfig,
    entries: DashMap<QuerySignature, CacheEntry>,
    version: AtomicU64,
    clock: AtomicU64,
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            version: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    /// Current store version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of stored signatures, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serve `signature` from the cache, or run `compute` and store its
    /// result under the version observed before computing.
    pub fn get_or_compute<F>(&self, signature: &QuerySignature, compute: F) -> CacheLookup
    where
        F: FnOnce() -> Vec<Entity>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let version = self.version();

        if let Some(entry) = self.entries.get(signature) {
            if entry.version == version {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return CacheLookup {
                    entities: Arc::clone(&entry.entities),
                    hit: true,
                };
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let entities: Arc<[Entity]> = compute().into();

        if self.config.max_entries > 0 {
            self.store(signature, version, Arc::clone(&entities));
            self.evict_over_capacity();
        }

        CacheLookup {
            entities,
            hit: false,
        }
    }

    fn store(&self, signature: &QuerySignature, version: u64, entities: Arc<[Entity]>) {
        let entry = CacheEntry {
            version,
            entities,
            last_access: AtomicU64::new(self.tick()),
        };
        match self.entries.entry(signature.clone()) {
            Entry::Occupied(mut slot) => {
                // A concurrent miss may already have stored a newer result.
                if slot.get().version <= version {
                    slot.insert(entry);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }

    /// Mark every stored result stale.
    pub fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop all entries, bump the version and reset the counters.
    pub fn clear(&self) {
        self.entries.clear();
        self.invalidate();
        self.lookups.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Remove every entry computed under an older version.
    pub fn purge_stale(&self) -> usize {
        let version = self.version();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.version == version);
        before.saturating_sub(self.entries.len())
    }

    pub fn statistics(&self) -> CacheStatistics {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        CacheStatistics {
            lookups,
            hits,
            misses,
            hit_rate,
            entries: self.entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            version: self.version(),
        }
    }

    #[inline]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict until under capacity: stale entries first, then least recently
    /// accessed.
    fn evict_over_capacity(&self) {
        while self.entries.len() > self.config.max_entries {
            let version = self.version();
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| {
                    (
                        entry.version == version,
                        entry.last_access.load(Ordering::Relaxed),
                    )
                })
                .map(|entry| entry.key().clone());

            let Some(signature) = victim else {
                break;
            };
            if self.entries.remove(&signature).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(signature = %signature, "evicted cached query");
            }
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn entities(count: u32) -> Vec<Entity> {
        let mut world = hecs::World::new();
        (0..count).map(|_| world.spawn(())).collect()
    }

    fn signature(id: u32) -> QuerySignature {
        QuerySignature::new().with_id(id)
    }

    #[test]
    fn second_lookup_is_a_hit_with_same_result() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);
        let expected = entities(3);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            expected.clone()
        };

        let first = cache.get_or_compute(&signature(1), compute);
        let second = cache.get_or_compute(&signature(1), compute);

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(&*first.entities, &*second.entities);
        assert_eq!(&*second.entities, expected.as_slice());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        };

        cache.get_or_compute(&signature(1), compute);
        cache.invalidate();
        let after = cache.get_or_compute(&signature(1), compute);

        assert!(!after.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn statistics_track_hits_and_reset_on_clear() {
        let cache = QueryCache::default();
        cache.get_or_compute(&signature(1), Vec::new);
        cache.get_or_compute(&signature(1), Vec::new);
        cache.get_or_compute(&signature(1), Vec::new);
        cache.get_or_compute(&signature(2), Vec::new);

        let stats = cache.statistics();
        assert_eq!(stats.lookups, 4);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.entries, 2);

        let version = cache.version();
        cache.clear();
        let cleared = cache.statistics();
        assert_eq!(cleared.lookups, 0);
        assert_eq!(cleared.entries, 0);
        assert_eq!(cleared.hit_rate, 0.0);
        assert!(cleared.version > version);
    }

    #[test]
    fn evicts_least_recently_accessed_over_capacity() {
        let cache = QueryCache::new(QueryCacheConfig { max_entries: 2 });
        cache.get_or_compute(&signature(1), Vec::new);
        cache.get_or_compute(&signature(2), Vec::new);
        // Touch 1 so 2 becomes the least recently used
        assert!(cache.get_or_compute(&signature(1), Vec::new).hit);
        cache.get_or_compute(&signature(3), Vec::new);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.statistics().evictions, 1);
        assert!(cache.get_or_compute(&signature(1), Vec::new).hit);
        assert!(cache.get_or_compute(&signature(3), Vec::new).hit);
        assert!(!cache.get_or_compute(&signature(2), Vec::new).hit);
    }

    #[test]
    fn stale_entries_are_evicted_before_fresh_ones() {
        let cache = QueryCache::new(QueryCacheConfig { max_entries: 2 });
        cache.get_or_compute(&signature(1), Vec::new);
        cache.invalidate();
        cache.get_or_compute(&signature(2), Vec::new);
        cache.get_or_compute(&signature(3), Vec::new);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_or_compute(&signature(2), Vec::new).hit);
        assert!(cache.get_or_compute(&signature(3), Vec::new).hit);
    }

    #[test]
    fn purge_stale_drops_only_old_versions() {
        let cache = QueryCache::default();
        cache.get_or_compute(&signature(1), Vec::new);
        cache.invalidate();
        cache.get_or_compute(&signature(2), Vec::new);

        assert_eq!(cache.purge_stale(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_disables_storage() {
        let cache = QueryCache::new(QueryCacheConfig { max_entries: 0 });
        assert!(!cache.get_or_compute(&signature(1), Vec::new).hit);
        assert!(!cache.get_or_compute(&signature(1), Vec::new).hit);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_lookups_agree_on_results() {
        let cache = QueryCache::new(QueryCacheConfig { max_entries: 4 });
        let expected = entities(5);

        std::thread::scope(|scope| {
            for worker in 0..8u32 {
                let cache = &cache;
                let expected = &expected;
                scope.spawn(move || {
                    for round in 0..200u32 {
                        let id = (worker + round) % 6;
                        let lookup = cache.get_or_compute(&signature(id), || expected.clone());
                        assert_eq!(&*lookup.entities, expected.as_slice());
                        if round % 50 == 0 {
                            cache.invalidate();
                        }
                    }
                });
            }
        });

        let stats = cache.statistics();
        assert_eq!(stats.lookups, 8 * 200);
        assert_eq!(stats.hits + stats.misses, stats.lookups);
        assert!(cache.len() <= 4);
    }
}
