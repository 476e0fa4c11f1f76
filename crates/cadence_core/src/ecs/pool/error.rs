use crate::ecs::{Entity, WorldError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool '{pool}' is exhausted (max size {max_size})")]
    Exhausted { pool: String, max_size: usize },

    #[error("entity {entity:?} is not active in pool '{pool}'")]
    NotActive { pool: String, entity: Entity },

    #[error("more '{component}' instances returned than were rented")]
    DoubleRelease { component: &'static str },

    #[error("no pool named '{0}'")]
    UnknownPool(String),

    #[error("a pool named '{0}' already exists")]
    DuplicatePool(String),

    #[error("pool '{0}' cannot be removed")]
    ProtectedPool(String),

    #[error(transparent)]
    World(#[from] WorldError),
}
