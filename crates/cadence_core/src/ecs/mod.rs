//! Entity Component System execution core.
//!
//! The archetype store itself is `hecs`, wrapped by [`World`]. On top of it
//! this module provides the pieces that let systems run in parallel each
//! tick: an explicit component registry, deferred command buffers, a
//! versioned query cache, entity and component pools, and the
//! dependency-ordered [`Scheduler`].

mod builder;
pub mod command;
mod component;
mod entity;
pub mod pool;
pub mod query;
mod scheduler;
mod system;
mod system_descriptor;
mod system_handle;
mod system_registration_error;
mod system_registry;
mod world;

pub use builder::EntityBuilder;
pub use command::{
    Command, CommandBuffer, CommandBufferError, CommandBufferPool, CommandError, CommandFailure,
    PlaybackReport,
};
pub use component::{
    meta_of, name_of, register_component, registered_components, Component, ComponentId,
    ComponentMeta, ENGINE_COMPONENT_ID_BASE,
};
pub use entity::{Entity, LogicalId, Target};
pub use pool::{
    ComponentPool, ComponentPoolManager, EntityPool, EntityPoolManager, PoolError, PoolMarker,
    PoolReset,
};
pub use query::{CacheLookup, CacheStatistics, QueryCache, QuerySignature, ResolvedSignature};
pub use scheduler::{
    DependencyGraph, ExecutionPlan, GraphNode, Scheduler, SchedulerError, Stage, TickReport,
};
pub use system::{FnSystem, RenderSystem, System, SystemContext, SystemError, SystemResult};
pub use system_descriptor::SystemDescriptor;
pub use system_handle::SystemHandle;
pub use system_registration_error::SystemRegistrationError;
pub use world::{World, WorldError, WorldId};
