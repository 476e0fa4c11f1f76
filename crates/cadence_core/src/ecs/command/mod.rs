//! # Commands
//!
//! Deferred structural mutations of the world.
//!
//! Systems never create, destroy, add or remove directly while a stage is
//! running. They record [`Command`]s into a [`CommandBuffer`], and the
//! buffer is played back at a synchronization point with exclusive access
//! to the world.
//!
//! ## Invariants
//! - Commands apply in the order they were recorded.
//! - A [`LogicalId`](crate::ecs::LogicalId) only resolves if a create
//!   command earlier in the same playback batch produced it.
//! - A failing command is logged and skipped; the rest of the batch still
//!   applies.
//! - Playback empties the buffer, so replaying it is a no-op.

mod buffer;
mod pool;

pub use buffer::{CommandBuffer, CommandBufferError, CommandFailure, PlaybackReport};
pub use pool::CommandBufferPool;

use crate::ecs::{name_of, ComponentId, Entity, LogicalId, Target};
use std::fmt;
use thiserror::Error;

/// Type-erased component value waiting to be inserted.
pub struct ComponentInsert(
    Box<dyn FnOnce(&mut hecs::World, Entity) -> Result<(), hecs::NoSuchEntity> + Send>,
);

impl ComponentInsert {
    pub(crate) fn new<T: hecs::Component>(value: T) -> Self {
        Self(Box::new(move |world, entity| world.insert_one(entity, value)))
    }

    fn apply(self, world: &mut hecs::World, entity: Entity) -> Result<(), hecs::NoSuchEntity> {
        (self.0)(world, entity)
    }
}

/// A recorded mutation intent.
pub enum Command {
    /// Spawn an empty entity and bind it to the logical id.
    CreateEntity(LogicalId),

    /// Destroy an entity and all of its components.
    DestroyEntity(Target),

    /// Attach (or replace) a component.
    AddComponent {
        target: Target,
        component: ComponentId,
        value: ComponentInsert,
    },

    /// Detach a component. Removing a component the entity lacks is an
    /// error.
    RemoveComponent {
        target: Target,
        component: ComponentId,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::CreateEntity(id) => write!(f, "CreateEntity({id})"),
            Command::DestroyEntity(target) => write!(f, "DestroyEntity({target})"),
            Command::AddComponent {
                target, component, ..
            } => write!(f, "AddComponent({target}, {})", name_of(*component)),
            Command::RemoveComponent { target, component } => {
                write!(f, "RemoveComponent({target}, {})", name_of(*component))
            }
        }
    }
}

/// Why a single command failed during playback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0} was not created earlier in this playback batch")]
    UnresolvedLogical(LogicalId),

    #[error("entity {0:?} does not exist (stale or destroyed handle)")]
    NoSuchEntity(Entity),

    #[error("entity {entity:?} has no '{component}' component to remove")]
    MissingComponent { entity: Entity, component: String },

    #[error("component id {0} is not registered")]
    UnregisteredComponent(ComponentId),
}
