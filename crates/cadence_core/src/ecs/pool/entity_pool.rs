use super::PoolError;
use crate::config::EntityPoolConfig;
use crate::define_component;
use crate::ecs::{Component, Entity, EntityBuilder, World, ENGINE_COMPONENT_ID_BASE};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Running mean of acquire durations.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LatencyTotal {
    total: Duration,
    samples: u64,
}

impl LatencyTotal {
    fn record(&mut self, elapsed: Duration) {
        self.total = self.total.saturating_add(elapsed);
        self.samples += 1;
    }

    pub(crate) fn average(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.samples);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Bookkeeping attached to every entity owned by an [`EntityPool`].
///
/// The marker survives release; it is the only component a pooled entity
/// keeps while it waits in the available list.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMarker {
    pub pool: Arc<str>,
    pub active: bool,
    pub acquired_at: Option<Instant>,
    /// Acquisitions after the first.
    pub reuse_count: u32,
}

define_component!(PoolMarker, ENGINE_COMPONENT_ID_BASE, "PoolMarker");

impl PoolMarker {
    fn idle(pool: &Arc<str>) -> Self {
        Self {
            pool: Arc::clone(pool),
            active: false,
            acquired_at: None,
            reuse_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityPoolStatistics {
    pub name: String,
    pub available: usize,
    pub active: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
    pub total_acquisitions: u64,
    pub total_releases: u64,
    /// `1 - created / acquisitions`, clamped to `[0, 1]`.
    pub reuse_rate: f64,
    pub average_acquire_latency: Duration,
}

pub(crate) fn reuse_rate(created: u64, acquisitions: u64) -> f64 {
    if acquisitions == 0 {
        return 0.0;
    }
    (1.0 - created as f64 / acquisitions as f64).clamp(0.0, 1.0)
}

struct PoolState {
    available: Vec<Entity>,
    active: HashSet<Entity>,
    total_created: u64,
    total_destroyed: u64,
    total_acquisitions: u64,
    total_releases: u64,
    acquire_latency: LatencyTotal,
}

impl PoolState {
    fn owned(&self) -> usize {
        self.available.len() + self.active.len()
    }
}

/// A bounded pool of reusable entities.
///
/// All operations take the pool lock for their whole duration; structural
/// operations also need `&mut World`, so they are not meant to run inside a
/// parallel stage.
pub struct EntityPool {
    name: Arc<str>,
    config: EntityPoolConfig,
    state: Mutex<PoolState>,
}

impl EntityPool {
    pub fn new(name: impl Into<Arc<str>>, config: EntityPoolConfig) -> Self {
        PoolMarker::ensure_registered();
        Self {
            name: name.into(),
            config,
            state: Mutex::new(PoolState {
                available: Vec::new(),
                active: HashSet::new(),
                total_created: 0,
                total_destroyed: 0,
                total_acquisitions: 0,
                total_releases: 0,
                acquire_latency: LatencyTotal::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EntityPoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self, entity: Entity) -> bool {
        self.lock().active.contains(&entity)
    }

    pub fn available_count(&self) -> usize {
        self.lock().available.len()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn spawn_idle(&self, world: &mut World) -> Entity {
        world.spawn(EntityBuilder::new().with(PoolMarker::idle(&self.name)))
    }

    /// Pre-create up to `count` available entities without exceeding
    /// `max_size`. Returns how many were created.
    pub fn warmup(&self, world: &mut World, count: usize) -> usize {
        let mut state = self.lock();
        let room = self.config.max_size.saturating_sub(state.owned());
        let created = count.min(room);
        for _ in 0..created {
            let entity = self.spawn_idle(world);
            state.available.push(entity);
        }
        state.total_created += created as u64;
        if created > 0 {
            tracing::debug!(pool = %self.name, created, "warmed entity pool");
        }
        created
    }

    /// Hand out an available entity, creating one if the pool has room.
    pub fn acquire(&self, world: &mut World) -> Result<Entity, PoolError> {
        let started = Instant::now();
        let mut state = self.lock();

        let mut reused = None;
        while let Some(candidate) = state.available.pop() {
            if world.contains(candidate) {
                reused = Some(candidate);
                break;
            }
            // Destroyed behind the pool's back; forget it.
            state.total_destroyed += 1;
        }

        let entity = match reused {
            Some(entity) => entity,
            None if state.owned() < self.config.max_size => {
                state.total_created += 1;
                self.spawn_idle(world)
            }
            None => {
                tracing::warn!(pool = %self.name, max_size = self.config.max_size, "entity pool exhausted");
                return Err(PoolError::Exhausted {
                    pool: self.name.to_string(),
                    max_size: self.config.max_size,
                });
            }
        };

        let now = Instant::now();
        let marked = match world.get_mut::<PoolMarker>(entity) {
            Some(mut marker) => {
                if marker.acquired_at.is_some() {
                    marker.reuse_count += 1;
                }
                marker.active = true;
                marker.acquired_at = Some(now);
                true
            }
            None => false,
        };
        if !marked {
            let mut marker = PoolMarker::idle(&self.name);
            marker.active = true;
            marker.acquired_at = Some(now);
            world.insert_one(entity, marker)?;
        }

        state.active.insert(entity);
        state.total_acquisitions += 1;
        state.acquire_latency.record(started.elapsed());
        Ok(entity)
    }

    /// Return an active entity: strip everything but its marker and make it
    /// available again.
    pub fn release(&self, world: &mut World, entity: Entity) -> Result<(), PoolError> {
        let mut state = self.lock();
        if !state.active.remove(&entity) {
            tracing::error!(pool = %self.name, ?entity, "release of an entity that is not active in this pool");
            return Err(PoolError::NotActive {
                pool: self.name.to_string(),
                entity,
            });
        }

        if let Err(err) = world.strip(entity, &[PoolMarker::ID]) {
            state.total_destroyed += 1;
            tracing::error!(pool = %self.name, ?entity, error = %err, "released entity no longer exists");
            return Err(err.into());
        }
        let marked = match world.get_mut::<PoolMarker>(entity) {
            Some(mut marker) => {
                marker.active = false;
                true
            }
            None => false,
        };
        if !marked {
            world.insert_one(entity, PoolMarker::idle(&self.name))?;
        }

        state.available.push(entity);
        state.total_releases += 1;
        Ok(())
    }

    /// Destroy every available entity. Active entities are untouched and the
    /// creation counters restart from them.
    pub fn clear(&self, world: &mut World) -> usize {
        let mut state = self.lock();
        let idle = std::mem::take(&mut state.available);
        let destroyed = world.despawn_batch(&idle);
        state.total_created = state.active.len() as u64;
        state.total_destroyed = 0;
        tracing::debug!(pool = %self.name, destroyed, "cleared entity pool");
        destroyed
    }

    pub fn statistics(&self) -> EntityPoolStatistics {
        let state = self.lock();
        EntityPoolStatistics {
            name: self.name.to_string(),
            available: state.available.len(),
            active: state.active.len(),
            total_created: state.total_created,
            total_destroyed: state.total_destroyed,
            total_acquisitions: state.total_acquisitions,
            total_releases: state.total_releases,
            reuse_rate: reuse_rate(state.total_created, state.total_acquisitions),
            average_acquire_latency: state.acquire_latency.average(),
        }
    }
}
