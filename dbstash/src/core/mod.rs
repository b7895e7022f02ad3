pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod key;
pub mod pending;
pub mod registry;
pub mod value;

pub use config::{ConfigStore, Configurable, StorageConfig};
pub use connection::ConnectionProvider;
pub use dispatcher::Dispatcher;
pub use error::{
    BoxError, DataAccessError, LifecycleError, StorageError, StorageResult, TypeRole,
};
pub use facade::{StorageBuilder, StorageFacade};
pub use key::{KeySerializer, NumberKeySerializer, StringKeySerializer, UuidKeySerializer};
pub use pending::PendingOperation;
pub use registry::{KeyHandle, Registry, RegistryBuilder, ValueHandle};
pub use value::ValueResolver;
