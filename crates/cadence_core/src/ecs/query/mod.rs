//! Query signatures and the versioned query result cache.
//!
//! Systems describe the entities they want with a [`QuerySignature`] and
//! route evaluation through the [`QueryCache`] attached to the world. Any
//! structural change to the world bumps the cache version, which lazily
//! invalidates every stored result.

mod cache;
mod signature;

pub use cache::{CacheLookup, CacheStatistics, QueryCache};
pub use signature::{QuerySignature, ResolvedSignature};
