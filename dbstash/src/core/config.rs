//! Configuration for the storage facade.
//!
//! TOML documents with typed sections. A missing section falls back to the
//! section type's `Default`.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::core::error::{StorageError, StorageResult};

// ============================================================================
// Configurable Trait
// ============================================================================

/// Trait for types that can be loaded from a configuration section
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use dbstash::core::config::Configurable;
///
/// #[derive(Debug, Deserialize, Default)]
/// pub struct PostgresConfig {
///     pub url: String,
/// }
///
/// impl Configurable for PostgresConfig {
///     const PREFIX: &'static str = "postgres";
/// }
/// ```
pub trait Configurable: DeserializeOwned + Default {
    /// TOML section name, e.g. `"storage"` for `[storage]`.
    const PREFIX: &'static str;
}

// ============================================================================
// Configuration Store
// ============================================================================

pub struct ConfigStore {
    data: toml::Value,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConfigStore {
    pub fn empty() -> Self {
        Self {
            data: toml::Value::Table(Default::default()),
        }
    }

    /// Create a configuration store from a TOML string
    pub fn parse(content: &str) -> StorageResult<Self> {
        let data: toml::Value = toml::from_str(content)
            .map_err(|e| StorageError::config(format!("failed to parse TOML: {}", e)))?;
        Ok(Self { data })
    }

    /// Create a configuration store from a file
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let data: toml::Value = toml::from_str(&content).map_err(|e| {
            StorageError::config(format!(
                "failed to parse TOML in '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { data })
    }

    /// Get a typed configuration section
    pub fn get<C: Configurable>(&self) -> StorageResult<C> {
        let section = self
            .data
            .get(C::PREFIX)
            .cloned()
            .unwrap_or(toml::Value::Table(Default::default()));

        debug!("Loading config section: {}", C::PREFIX);

        section.try_into().map_err(|e| {
            StorageError::config(format!(
                "failed to deserialize config section '{}': {}",
                C::PREFIX,
                e
            ))
        })
    }
}

// ============================================================================
// Storage Section
// ============================================================================

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Number of worker tasks executing storage operations.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of operations waiting for a worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> StorageResult<()> {
        if self.workers == 0 {
            return Err(StorageError::config("storage.workers must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(StorageError::config(
                "storage.queue_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

impl Configurable for StorageConfig {
    const PREFIX: &'static str = "storage";
}
