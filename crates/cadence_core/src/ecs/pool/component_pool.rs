// component_pool.rs - Per-type free lists of component values
//
// Returned values are reset in place through `PoolReset` and kept, so their
// heap allocations survive into the next rent. The manager keeps one pool
// per component ID behind a type-erased handle so pools can be listed and
// looked up by component name without knowing the concrete type.

use super::entity_pool::reuse_rate;
use super::PoolError;
use crate::config::ComponentPoolConfig;
use crate::ecs::{Component, ComponentId};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Returns a pooled value to its default state before it is rented again.
///
/// The default replaces the whole value. Types owning buffers should
/// override it to clear them in place so the allocation is reused.
pub trait PoolReset: Default {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPoolStatistics {
    pub component: &'static str,
    pub available: usize,
    pub rented: usize,
    pub total_created: u64,
    pub total_rented: u64,
    pub total_returned: u64,
    pub reuse_rate: f64,
}

struct PoolState<T> {
    free: Vec<T>,
    rented: usize,
    total_created: u64,
    total_rented: u64,
    total_returned: u64,
}

/// Bounded free list of one component type.
pub struct ComponentPool<T> {
    config: ComponentPoolConfig,
    state: Mutex<PoolState<T>>,
}

impl<T: Component + PoolReset> ComponentPool<T> {
    pub fn new(config: ComponentPoolConfig) -> Self {
        T::ensure_registered();
        Self {
            config,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                rented: 0,
                total_created: 0,
                total_rented: 0,
                total_returned: 0,
            }),
        }
    }

    pub fn config(&self) -> &ComponentPoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reset value, creating one if the pool has room.
    pub fn rent(&self) -> Result<T, PoolError> {
        let mut state = self.lock();
        let value = match state.free.pop() {
            Some(value) => value,
            None if state.rented < self.config.max_size => {
                state.total_created += 1;
                T::default()
            }
            None => {
                tracing::warn!(component = T::NAME, max_size = self.config.max_size, "component pool exhausted");
                return Err(PoolError::Exhausted {
                    pool: T::NAME.to_string(),
                    max_size: self.config.max_size,
                });
            }
        };
        state.rented += 1;
        state.total_rented += 1;
        Ok(value)
    }

    /// Hand a value back. It is reset before it can be rented again.
    pub fn give_back(&self, mut value: T) -> Result<(), PoolError> {
        let mut state = self.lock();
        if state.rented == 0 {
            tracing::error!(component = T::NAME, "component returned to a pool with nothing rented");
            return Err(PoolError::DoubleRelease { component: T::NAME });
        }
        state.rented -= 1;
        state.total_returned += 1;
        if state.free.len() + state.rented < self.config.max_size {
            value.reset();
            state.free.push(value);
        }
        Ok(())
    }

    /// Fill the free list with up to `count` fresh values.
    pub fn prewarm(&self, count: usize) -> usize {
        let mut state = self.lock();
        let room = self
            .config
            .max_size
            .saturating_sub(state.free.len() + state.rented);
        let created = count.min(room);
        state.free.extend(std::iter::repeat_with(T::default).take(created));
        state.total_created += created as u64;
        created
    }

    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    pub fn rented(&self) -> usize {
        self.lock().rented
    }

    /// Drop every pooled value. Rented values are unaffected.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.free.len();
        state.free.clear();
        state.total_created = state.rented as u64;
        dropped
    }

    pub fn statistics(&self) -> ComponentPoolStatistics {
        let state = self.lock();
        ComponentPoolStatistics {
            component: T::NAME,
            available: state.free.len(),
            rented: state.rented,
            total_created: state.total_created,
            total_rented: state.total_rented,
            total_returned: state.total_returned,
            reuse_rate: reuse_rate(state.total_created, state.total_rented),
        }
    }
}

/// Object-safe view of a [`ComponentPool`] of any type.
pub trait ErasedComponentPool: Send + Sync {
    fn component_id(&self) -> ComponentId;
    fn component_name(&self) -> &'static str;
    fn prewarm(&self, count: usize) -> usize;
    fn clear(&self) -> usize;
    fn statistics(&self) -> ComponentPoolStatistics;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component + PoolReset> ErasedComponentPool for ComponentPool<T> {
    fn component_id(&self) -> ComponentId {
        T::ID
    }

    fn component_name(&self) -> &'static str {
        T::NAME
    }

    fn prewarm(&self, count: usize) -> usize {
        ComponentPool::prewarm(self, count)
    }

    fn clear(&self) -> usize {
        ComponentPool::clear(self)
    }

    fn statistics(&self) -> ComponentPoolStatistics {
        ComponentPool::statistics(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// One pool per component type, created on first use.
pub struct ComponentPoolManager {
    config: ComponentPoolConfig,
    pools: DashMap<ComponentId, Arc<dyn ErasedComponentPool>>,
}

impl ComponentPoolManager {
    pub fn new(config: ComponentPoolConfig) -> Self {
        Self {
            config,
            pools: DashMap::new(),
        }
    }

    /// The pool for `T`, created with the manager's config if missing.
    pub fn pool<T: Component + PoolReset>(&self) -> Arc<ComponentPool<T>> {
        let erased = Arc::clone(
            self.pools
                .entry(T::ID)
                .or_insert_with(|| {
                    Arc::new(ComponentPool::<T>::new(self.config.clone()))
                        as Arc<dyn ErasedComponentPool>
                })
                .value(),
        );
        match erased.into_any().downcast::<ComponentPool<T>>() {
            Ok(pool) => pool,
            // The registry refuses two types under one ID.
            Err(_) => unreachable!("component id {} maps to a different type", T::ID),
        }
    }

    /// Look up an existing pool by component name.
    pub fn pool_by_name(&self, name: &str) -> Result<Arc<dyn ErasedComponentPool>, PoolError> {
        self.pools
            .iter()
            .find(|entry| entry.value().component_name() == name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn clear_all(&self) -> usize {
        self.pools.iter().map(|entry| entry.value().clear()).sum()
    }

    /// Per-type statistics ordered by component name.
    pub fn statistics(&self) -> Vec<ComponentPoolStatistics> {
        let mut stats: Vec<ComponentPoolStatistics> =
            self.pools.iter().map(|entry| entry.value().statistics()).collect();
        stats.sort_by(|a, b| a.component.cmp(b.component));
        stats
    }
}

impl Default for ComponentPoolManager {
    fn default() -> Self {
        Self::new(ComponentPoolConfig::default())
    }
}
