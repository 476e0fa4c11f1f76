// world.rs - Store facade shared by systems, pools and command buffers
//
// Wraps the archetype store (hecs) and owns the query cache attached to it.
// Every structural mutation funnels through this type so the cache version
// is bumped on all of them.

use crate::config::QueryCacheConfig;
use crate::ecs::{
    registered_components, CacheLookup, Component, ComponentId, ComponentMeta, Entity,
    EntityBuilder, QueryCache, QuerySignature,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Process-unique identifier of a [`World`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("entity {0:?} does not exist (stale or destroyed handle)")]
    NoSuchEntity(Entity),

    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },
}

/// The entity/component store as seen by the execution core.
///
/// Systems receive `&World`: they may read components and write the ones
/// they declared through [`get_mut`](Self::get_mut) or
/// [`query`](Self::query), whose borrows are checked dynamically. Structural
/// changes (spawn, despawn, insert, remove) need `&mut World` and are
/// normally issued through a command buffer.
pub struct World {
    id: WorldId,
    inner: hecs::World,
    queries: Arc<QueryCache>,
}

impl World {
    /// Create a new empty world with a default-sized query cache.
    pub fn new() -> Self {
        Self::with_query_cache(Arc::new(QueryCache::default()))
    }

    pub fn with_cache_config(config: QueryCacheConfig) -> Self {
        Self::with_query_cache(Arc::new(QueryCache::new(config)))
    }

    /// Create a world reporting structural changes to `queries`.
    pub fn with_query_cache(queries: Arc<QueryCache>) -> Self {
        Self {
            id: WorldId::next(),
            inner: hecs::World::new(),
            queries,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    /// The cache invalidated by this world's structural changes.
    pub fn query_cache(&self) -> &Arc<QueryCache> {
        &self.queries
    }

    fn structure_changed(&self) {
        self.queries.invalidate();
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Spawn an entity from a builder.
    pub fn spawn(&mut self, mut builder: EntityBuilder) -> Entity {
        let entity = self.inner.spawn(builder.build());
        self.structure_changed();
        entity
    }

    /// Spawn an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.inner.spawn(());
        self.structure_changed();
        entity
    }

    /// Destroy an entity and drop all its components.
    ///
    /// The store bumps the slot's generation, so every outstanding copy of
    /// the handle becomes stale.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.inner
            .despawn(entity)
            .map_err(|_| WorldError::NoSuchEntity(entity))?;
        self.structure_changed();
        Ok(())
    }

    /// Bulk unload: destroy every live entity in `entities`, invalidating the
    /// cache once. Returns how many were destroyed.
    pub fn despawn_batch(&mut self, entities: &[Entity]) -> usize {
        let destroyed = entities
            .iter()
            .filter(|&&entity| self.inner.despawn(entity).is_ok())
            .count();
        if destroyed > 0 {
            self.structure_changed();
        }
        destroyed
    }

    /// Destroy everything.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.structure_changed();
    }

    /// Attach (or replace) a component.
    pub fn insert_one<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), WorldError> {
        T::ensure_registered();
        self.inner
            .insert_one(entity, value)
            .map_err(|_| WorldError::NoSuchEntity(entity))?;
        self.structure_changed();
        Ok(())
    }

    /// Detach a component and hand it back.
    pub fn remove_one<T: Component>(&mut self, entity: Entity) -> Result<T, WorldError> {
        let value = self
            .inner
            .remove_one::<T>(entity)
            .map_err(|err| component_error(err, entity, T::NAME))?;
        self.structure_changed();
        Ok(value)
    }

    /// Remove every registered component from `entity` except those in
    /// `keep`, invalidating the cache once. Returns how many were removed.
    pub(crate) fn strip(&mut self, entity: Entity, keep: &[ComponentId]) -> Result<usize, WorldError> {
        let present: Vec<ComponentMeta> = {
            let entity_ref = self
                .inner
                .entity(entity)
                .map_err(|_| WorldError::NoSuchEntity(entity))?;
            registered_components()
                .into_iter()
                .filter(|meta| !keep.contains(&meta.id) && meta.is_present(&entity_ref))
                .collect()
        };
        for meta in &present {
            meta.remove_from(&mut self.inner, entity)
                .map_err(|err| component_error(err, entity, meta.name))?;
        }
        if !present.is_empty() {
            self.structure_changed();
        }
        Ok(present.len())
    }

    /// Raw store access for batched mutation; callers own cache invalidation.
    pub(crate) fn store_mut(&mut self) -> &mut hecs::World {
        &mut self.inner
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Whether the handle refers to a live entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.inner.contains(entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.inner
            .entity(entity)
            .map(|entity| entity.has::<T>())
            .unwrap_or(false)
    }

    /// Shared borrow of a component.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<hecs::Ref<'_, T>> {
        self.inner.get::<&T>(entity).ok()
    }

    /// Exclusive borrow of a component through a shared world.
    ///
    /// Borrows are checked at runtime per archetype column; a conflicting
    /// outstanding borrow panics. The scheduler never co-stages systems
    /// whose declared access would let that happen.
    pub fn get_mut<T: Component>(&self, entity: Entity) -> Option<hecs::RefMut<'_, T>> {
        self.inner.get::<&mut T>(entity).ok()
    }

    /// Typed iteration over the store.
    pub fn query<Q: hecs::Query>(&self) -> hecs::QueryBorrow<'_, Q> {
        self.inner.query::<Q>()
    }

    /// Read-only view of the underlying store.
    pub fn store(&self) -> &hecs::World {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Entities matching `signature`, ordered by index. Uncached.
    pub fn matching(&self, signature: &QuerySignature) -> Vec<Entity> {
        let Some(resolved) = signature.resolve() else {
            return Vec::new();
        };
        let mut entities: Vec<Entity> = self
            .inner
            .iter()
            .filter(|entity| resolved.matches(entity))
            .map(|entity| entity.entity())
            .collect();
        entities.sort_unstable_by_key(|entity| entity.id());
        entities
    }

    /// [`matching`](Self::matching) routed through the attached cache.
    pub fn query_cached(&self, signature: &QuerySignature) -> CacheLookup {
        self.queries
            .get_or_compute(signature, || self.matching(signature))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn component_error(err: hecs::ComponentError, entity: Entity, component: &'static str) -> WorldError {
    match err {
        hecs::ComponentError::NoSuchEntity => WorldError::NoSuchEntity(entity),
        hecs::ComponentError::MissingComponent(_) => WorldError::MissingComponent { entity, component },
    }
}
