//! # Pools
//!
//! Reuse of entities and component instances under spawn/despawn churn.
//!
//! [`EntityPool`] keeps released entities alive with only a [`PoolMarker`]
//! attached and hands them out again on the next acquire. Component pools
//! keep reset values of a single component type. Both use one coarse lock
//! per pool; the managers map names (or component types) to pools.
//!
//! Exhaustion, double release and unknown pool names are all reported as
//! [`PoolError`]s. A pool never hands out an entity it already handed out.

mod component_pool;
mod entity_pool;
mod error;
mod manager;

pub use component_pool::{
    ComponentPool, ComponentPoolManager, ComponentPoolStatistics, ErasedComponentPool, PoolReset,
};
pub use entity_pool::{EntityPool, EntityPoolStatistics, PoolMarker};
pub use error::PoolError;
pub use manager::{EntityPoolManager, PoolManagerStatistics, DEFAULT_POOL};
