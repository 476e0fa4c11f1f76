//! Entity handles and deferred entity references
//!
//! Real entities are generational handles owned by the store: a handle is
//! valid only while the store's generation for its index matches. Command
//! buffers additionally hand out [`LogicalId`]s for entities that will only
//! exist once the buffer is played back.

use std::fmt;

pub use hecs::Entity;

/// Placeholder for an entity recorded with `record_create` and not yet
/// spawned.
///
/// The `token` identifies the buffer batch that issued the id. Each clear of
/// a buffer starts a new batch, so ids never resolve outside the playback
/// they were recorded for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId {
    token: u64,
    index: u32,
}

impl LogicalId {
    pub(crate) const fn new(token: u64, index: u32) -> Self {
        Self { token, index }
    }

    /// Position of the create command within its batch.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Batch token of the issuing buffer.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Sentinel encoding: always negative, so it can never collide with a
    /// real entity index.
    pub fn raw(&self) -> i64 {
        -(self.index as i64) - 1
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "logical({})@{}", self.raw(), self.token)
    }
}

/// Entity a command applies to: either live, or created earlier in the same
/// batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Entity(Entity),
    Logical(LogicalId),
}

impl From<Entity> for Target {
    fn from(entity: Entity) -> Self {
        Target::Entity(entity)
    }
}

impl From<LogicalId> for Target {
    fn from(id: LogicalId) -> Self {
        Target::Logical(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Entity(entity) => write!(f, "{entity:?}"),
            Target::Logical(id) => write!(f, "{id}"),
        }
    }
}
