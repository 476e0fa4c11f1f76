// component.rs - Runtime component registration
//
// Components are identified by u32 IDs, not Rust TypeIds. Read/write sets,
// query signatures and commands all speak in these IDs; the registry maps an
// ID back to the type-erased operations the core needs.

use hecs::{ComponentError, Entity, EntityRef};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

pub type ComponentId = u32;

/// First ID reserved for components defined by the engine itself.
pub const ENGINE_COMPONENT_ID_BASE: ComponentId = 0xFFFF_0000;

/// Metadata and type-erased operations for one registered component type.
#[derive(Clone, Copy)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub type_id: TypeId,
    has: fn(&EntityRef<'_>) -> bool,
    remove: fn(&mut hecs::World, Entity) -> Result<(), ComponentError>,
}

impl ComponentMeta {
    /// Whether the entity behind `entity` carries this component.
    #[inline]
    pub fn is_present(&self, entity: &EntityRef<'_>) -> bool {
        (self.has)(entity)
    }

    /// Remove this component from `entity`, dropping the value.
    pub(crate) fn remove_from(
        &self,
        world: &mut hecs::World,
        entity: Entity,
    ) -> Result<(), ComponentError> {
        (self.remove)(world, entity)
    }
}

impl fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for ComponentMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.type_id == other.type_id
    }
}

impl Eq for ComponentMeta {}

/// Global registry of every component type the core has seen.
static REGISTRY: Lazy<RwLock<HashMap<ComponentId, ComponentMeta>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn has_component<T: Component>(entity: &EntityRef<'_>) -> bool {
    entity.has::<T>()
}

fn remove_component<T: Component>(
    world: &mut hecs::World,
    entity: Entity,
) -> Result<(), ComponentError> {
    world.remove_one::<T>(entity).map(|_| ())
}

/// Register `T` under its declared ID.
///
/// Re-registering the same type is a no-op. Claiming an ID that already
/// belongs to a different type is a programming error and panics.
pub fn register_component<T: Component>() {
    let type_id = TypeId::of::<T>();
    {
        let map = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(&T::ID) {
            assert_eq!(
                existing.type_id, type_id,
                "Component id {} is claimed by both '{}' and '{}'",
                T::ID, existing.name, T::NAME
            );
            return;
        }
    }

    let mut map = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    let meta = map.entry(T::ID).or_insert_with(|| ComponentMeta {
        id: T::ID,
        name: T::NAME,
        type_id,
        has: has_component::<T>,
        remove: remove_component::<T>,
    });
    assert_eq!(
        meta.type_id, type_id,
        "Component id {} is claimed by both '{}' and '{}'",
        T::ID, meta.name, T::NAME
    );
}

/// Look up component metadata by ID.
pub fn meta_of(id: ComponentId) -> Option<ComponentMeta> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied()
}

/// Human-readable name for an ID, falling back to the raw number.
pub fn name_of(id: ComponentId) -> String {
    meta_of(id)
        .map(|meta| meta.name.to_string())
        .unwrap_or_else(|| format!("#{id}"))
}

/// Snapshot of every registered component, ordered by ID.
pub fn registered_components() -> Vec<ComponentMeta> {
    let mut metas: Vec<ComponentMeta> = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .copied()
        .collect();
    metas.sort_unstable_by_key(|meta| meta.id);
    metas
}

/// Trait for component types stored in the world.
///
/// Implement through [`define_component!`](crate::define_component). IDs
/// must be unique across the program; `ENGINE_COMPONENT_ID_BASE` and above
/// belong to the engine.
pub trait Component: hecs::Component + Sized {
    /// Globally unique component ID.
    const ID: ComponentId;

    /// Human-readable name for debugging.
    const NAME: &'static str;

    /// Register this component with the global registry.
    ///
    /// Cheap after the first call; every typed entry point into the core
    /// calls it so erased lookups by ID always succeed.
    fn ensure_registered() {
        register_component::<Self>();
    }
}

/// Helper macro to implement Component trait.
///
/// # Example
/// ```ignore
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, 1, "Position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $id:expr, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const ID: $crate::ecs::ComponentId = $id;
            const NAME: &'static str = $name;
        }
    };
}
