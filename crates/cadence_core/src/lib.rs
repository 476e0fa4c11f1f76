//! Cadence Core
//!
//! The per-tick execution core of the engine:
//! - Component registry and store facade over `hecs`
//! - Deferred command buffers and the query result cache
//! - Entity and component pools
//! - Dependency-ordered parallel system scheduler
//! - Fixed-rate simulation time

pub mod config;
pub mod ecs;
pub mod time;

pub use config::CoreConfig;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
