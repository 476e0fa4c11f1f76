use super::entity_pool::reuse_rate;
use super::{EntityPool, EntityPoolStatistics, PoolError};
use crate::config::EntityPoolConfig;
use crate::ecs::World;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Name of the pool every manager starts with.
pub const DEFAULT_POOL: &str = "default";

/// Per-pool records plus their sum.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolManagerStatistics {
    /// Ordered by pool name.
    pub pools: Vec<EntityPoolStatistics>,
    pub total: EntityPoolStatistics,
}

/// Named entity pools with an always-present default.
pub struct EntityPoolManager {
    default_config: EntityPoolConfig,
    default: Arc<EntityPool>,
    pools: DashMap<String, Arc<EntityPool>>,
}

impl EntityPoolManager {
    /// Create a manager whose default pool uses `config`, warmed up by
    /// `config.warmup` entities.
    pub fn new(world: &mut World, config: EntityPoolConfig) -> Self {
        let default = Arc::new(EntityPool::new(DEFAULT_POOL, config.clone()));
        default.warmup(world, config.warmup);
        let pools = DashMap::new();
        pools.insert(DEFAULT_POOL.to_string(), Arc::clone(&default));
        Self {
            default_config: config,
            default,
            pools,
        }
    }

    /// Configuration applied to pools created without one.
    pub fn default_config(&self) -> &EntityPoolConfig {
        &self.default_config
    }

    pub fn default_pool(&self) -> Arc<EntityPool> {
        Arc::clone(&self.default)
    }

    /// Register a new named pool and warm it up.
    pub fn create_pool(
        &self,
        world: &mut World,
        name: &str,
        config: EntityPoolConfig,
    ) -> Result<Arc<EntityPool>, PoolError> {
        let pool = match self.pools.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(PoolError::DuplicatePool(name.to_string())),
            Entry::Vacant(slot) => {
                let pool = Arc::new(EntityPool::new(name, config));
                slot.insert(Arc::clone(&pool));
                pool
            }
        };
        pool.warmup(world, pool.config().warmup);
        tracing::debug!(pool = name, max_size = pool.config().max_size, "created entity pool");
        Ok(pool)
    }

    /// Look up a pool by name.
    pub fn pool(&self, name: &str) -> Result<Arc<EntityPool>, PoolError> {
        self.pools
            .get(name)
            .map(|pool| Arc::clone(pool.value()))
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))
    }

    /// Clear and unregister a pool. Its active entities stay in the world
    /// but are no longer tracked.
    pub fn remove_pool(&self, world: &mut World, name: &str) -> Result<usize, PoolError> {
        if name == DEFAULT_POOL {
            return Err(PoolError::ProtectedPool(name.to_string()));
        }
        let (_, pool) = self
            .pools
            .remove(name)
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))?;
        Ok(pool.clear(world))
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Clear every pool. Returns the number of entities destroyed.
    pub fn clear_all(&self, world: &mut World) -> usize {
        let pools: Vec<Arc<EntityPool>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        pools.iter().map(|pool| pool.clear(world)).sum()
    }

    pub fn statistics(&self) -> PoolManagerStatistics {
        let mut pools: Vec<EntityPoolStatistics> =
            self.pools.iter().map(|entry| entry.value().statistics()).collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        let total = aggregate(&pools);
        PoolManagerStatistics { pools, total }
    }
}

fn aggregate(pools: &[EntityPoolStatistics]) -> EntityPoolStatistics {
    let mut total = EntityPoolStatistics {
        name: "*".to_string(),
        available: 0,
        active: 0,
        total_created: 0,
        total_destroyed: 0,
        total_acquisitions: 0,
        total_releases: 0,
        reuse_rate: 0.0,
        average_acquire_latency: Duration::ZERO,
    };
    let mut weighted: u128 = 0;
    for stats in pools {
        total.available += stats.available;
        total.active += stats.active;
        total.total_created += stats.total_created;
        total.total_destroyed += stats.total_destroyed;
        total.total_acquisitions += stats.total_acquisitions;
        total.total_releases += stats.total_releases;
        weighted += stats.average_acquire_latency.as_nanos() * u128::from(stats.total_acquisitions);
    }
    total.reuse_rate = reuse_rate(total.total_created, total.total_acquisitions);
    if total.total_acquisitions > 0 {
        let nanos = weighted / u128::from(total.total_acquisitions);
        total.average_acquire_latency = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
    }
    total
}
