// Convenience re-exports: use dbstash::prelude::*;
pub use crate::core::{
    BoxError, ConfigStore, Configurable, ConnectionProvider, DataAccessError, KeySerializer,
    NumberKeySerializer, PendingOperation, StorageConfig, StorageError, StorageBuilder,
    StorageFacade, StorageResult, ValueResolver,
};

pub use crate::memory::{JsonResolver, MemoryConnection, MemoryProvider};

// Re-export async_trait for resolver and provider impls
pub use async_trait::async_trait;
