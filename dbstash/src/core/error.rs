//! Error taxonomy for the storage facade.
//!
//! Three families matter to callers:
//! - [`StorageError::UnregisteredType`] is a programmer error, returned
//!   synchronously before any work is scheduled.
//! - [`DataAccessError`] comes from the backing store and is delivered through
//!   the [`PendingOperation`](crate::core::PendingOperation).
//! - [`LifecycleError`] covers opening and closing the connection.

use std::fmt;

use thiserror::Error;

/// Boxed error used at plugin boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which side of the registry a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRole {
    Key,
    Value,
}

impl fmt::Display for TypeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRole::Key => f.write_str("key serializer"),
            TypeRole::Value => f.write_str("value resolver"),
        }
    }
}

/// The backing store failed to save, retrieve or delete a row.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DataAccessError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl DataAccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying driver error.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Opening or closing the connection failed.
///
/// The facade treats both as fatal: nothing is retried.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to establish connection: {source}")]
    Connect {
        #[source]
        source: BoxError,
    },

    #[error("failed to close connection: {source}")]
    Close {
        #[source]
        source: BoxError,
    },
}

impl LifecycleError {
    pub fn connect(source: impl Into<BoxError>) -> Self {
        Self::Connect {
            source: source.into(),
        }
    }

    pub fn close(source: impl Into<BoxError>) -> Self {
        Self::Close {
            source: source.into(),
        }
    }
}

/// Errors returned by the storage facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// No handler registered for the exact type.
    #[error("no {role} registered for type `{type_name}`")]
    UnregisteredType {
        role: TypeRole,
        type_name: &'static str,
    },

    #[error("data access failed: {0}")]
    DataAccess(#[from] DataAccessError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The facade was used after `shutdown`.
    #[error("storage has been shut down")]
    ShutDown,

    /// The dispatcher queue is full; nothing was scheduled.
    #[error("dispatcher queue is full ({capacity} pending operations)")]
    Saturated { capacity: usize },

    #[error("cannot decode `{raw}` as `{type_name}`: {reason}")]
    KeyDecode {
        type_name: &'static str,
        raw: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn unregistered_key<K: ?Sized>() -> Self {
        Self::UnregisteredType {
            role: TypeRole::Key,
            type_name: std::any::type_name::<K>(),
        }
    }

    pub fn unregistered_value<V: ?Sized>() -> Self {
        Self::UnregisteredType {
            role: TypeRole::Value,
            type_name: std::any::type_name::<V>(),
        }
    }

    pub fn key_decode<K: ?Sized>(raw: &str, reason: impl fmt::Display) -> Self {
        Self::KeyDecode {
            type_name: std::any::type_name::<K>(),
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::UnregisteredType { .. })
    }

    pub fn is_data_access(&self) -> bool {
        matches!(self, Self::DataAccess(_))
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
