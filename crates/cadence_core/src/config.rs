//! Execution core configuration
//!
//! Plain serde records with defaults. The core never reads files or the
//! environment on its own; the embedding application decides where a
//! [`CoreConfig`] comes from and hands the sections to the subsystems.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub query_cache: QueryCacheConfig,
    pub entity_pool: EntityPoolConfig,
    pub component_pool: ComponentPoolConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCacheConfig {
    /// Maximum number of cached signatures. `0` disables caching.
    pub max_entries: usize,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self { max_entries: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityPoolConfig {
    /// Upper bound on available + active entities.
    pub max_size: usize,
    /// Entities to pre-create when a pool is set up through a manager.
    pub warmup: usize,
}

impl Default for EntityPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 1024,
            warmup: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentPoolConfig {
    /// Upper bound on pooled + rented instances per component type.
    pub max_size: usize,
}

impl Default for ComponentPoolConfig {
    fn default() -> Self {
        Self { max_size: 4096 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads for stage fan-out; `None` uses the global rayon pool.
    pub worker_threads: Option<usize>,
    /// Idle command buffers kept for reuse between ticks.
    pub command_buffer_pool_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            command_buffer_pool_capacity: 64,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CoreConfig {
    /// Parse a JSON document. Missing sections and fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
