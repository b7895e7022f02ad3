//! The storage facade: registry lookup on the caller's task, I/O on the pool.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::core::config::{ConfigStore, StorageConfig};
use crate::core::connection::{ConnectionProvider, ConnectionSlot};
use crate::core::dispatcher::Dispatcher;
use crate::core::error::{StorageError, StorageResult};
use crate::core::key::KeySerializer;
use crate::core::pending::PendingOperation;
use crate::core::registry::{Registry, RegistryBuilder};
use crate::core::value::ValueResolver;

// ============================================================================
// Storage Builder
// ============================================================================

/// Builder for a [`StorageFacade`].
///
/// # Example
///
/// ```ignore
/// use dbstash::prelude::*;
///
/// let storage = StorageBuilder::new(MemoryProvider::new())
///     .config_file("config.toml")?
///     .key_serializer(NumberKeySerializer::<i64>::new())
///     .value_resolver(JsonResolver::<Profile>::new("profiles"))
///     .build()
///     .await?;
/// ```
pub struct StorageBuilder<P: ConnectionProvider> {
    provider: P,
    config: StorageConfig,
    registry: RegistryBuilder<P::Connection>,
}

impl<P: ConnectionProvider> StorageBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: StorageConfig::default(),
            registry: RegistryBuilder::new(),
        }
    }

    /// Load the `[storage]` section from a TOML file
    pub fn config_file(self, path: impl AsRef<Path>) -> StorageResult<Self> {
        let store = ConfigStore::from_file(path)?;
        self.config_store(&store)
    }

    /// Load the `[storage]` section from an existing store
    pub fn config_store(mut self, store: &ConfigStore) -> StorageResult<Self> {
        self.config = store.get()?;
        Ok(self)
    }

    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Register a key serializer. `String` and `Uuid` are always present.
    pub fn key_serializer<S: KeySerializer>(mut self, serializer: S) -> Self {
        self.registry.push_key(serializer);
        self
    }

    pub fn value_resolver<R: ValueResolver<P::Connection>>(mut self, resolver: R) -> Self {
        self.registry.push_value(resolver);
        self
    }

    /// Build the registry and start the worker pool.
    ///
    /// Must run inside a multi-thread Tokio runtime: the workers are spawned
    /// onto it, and on a `current_thread` runtime they share the caller's
    /// thread. The connection is not opened here; see [`StorageFacade::init`].
    pub async fn build(self) -> StorageResult<StorageFacade<P>> {
        self.config.validate()?;

        let registry = self.registry.build();
        info!(
            "Storage ready: {} workers, key types {:?}, value types {:?}",
            self.config.workers,
            registry.key_types(),
            registry.value_types()
        );

        Ok(StorageFacade {
            inner: Arc::new(Inner {
                registry,
                connection: ConnectionSlot::new(self.provider),
                dispatcher: Dispatcher::new(self.config.workers, self.config.queue_capacity),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

// ============================================================================
// Storage Facade
// ============================================================================

struct Inner<P: ConnectionProvider> {
    registry: Registry<P::Connection>,
    connection: ConnectionSlot<P>,
    dispatcher: Dispatcher,
    shut_down: AtomicBool,
}

/// Key/value persistence over a single shared connection.
///
/// Each operation resolves its key serializer and value resolver by exact
/// type on the calling task. A miss returns
/// [`StorageError::UnregisteredType`] immediately and schedules nothing. On a
/// hit the work is queued on the worker pool and a [`PendingOperation`] is
/// returned.
///
/// Operations on the same key are not ordered relative to each other.
///
/// Cloning is cheap; clones share the connection and the pool.
pub struct StorageFacade<P: ConnectionProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: ConnectionProvider> Clone for StorageFacade<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ConnectionProvider> StorageFacade<P> {
    pub fn builder(provider: P) -> StorageBuilder<P> {
        StorageBuilder::new(provider)
    }

    /// Open the connection now instead of on first use.
    pub async fn init(&self) -> StorageResult<()> {
        self.ensure_running()?;
        self.inner.connection.get().await.map(|_| ())
    }

    /// The live connection, opened on demand.
    ///
    /// After [`shutdown`](Self::shutdown) this returns
    /// [`StorageError::ShutDown`]; the connection is never reopened.
    pub async fn connection(&self) -> StorageResult<Arc<P::Connection>> {
        self.ensure_running()?;
        self.inner.connection.get().await
    }

    pub fn registry(&self) -> &Registry<P::Connection> {
        &self.inner.registry
    }

    /// Store `value` under `key`. Resolves to `true` once written.
    pub fn save_async<K, V>(&self, key: &K, value: V) -> StorageResult<PendingOperation<bool>>
    where
        K: 'static,
        V: Send + Sync + 'static,
    {
        self.ensure_running()?;
        let key = self.inner.registry.require_key::<K>()?.serialize(key);
        let resolver = self.inner.registry.require_value::<V>()?;

        let inner = Arc::clone(&self.inner);
        self.inner.dispatcher.submit(async move {
            let connection = inner.connection.get().await?;
            resolver.save(&connection, &key, &value).await?;
            Ok(true)
        })
    }

    /// Fetch the `V` stored under `key`. Resolves to `None` when absent.
    ///
    /// ```ignore
    /// let profile: Option<Profile> = storage.retrieve_async(&id)?.await?;
    /// ```
    pub fn retrieve_async<V, K>(&self, key: &K) -> StorageResult<PendingOperation<Option<V>>>
    where
        V: Send + Sync + 'static,
        K: 'static,
    {
        self.ensure_running()?;
        let key = self.inner.registry.require_key::<K>()?.serialize(key);
        let resolver = self.inner.registry.require_value::<V>()?;

        let inner = Arc::clone(&self.inner);
        self.inner.dispatcher.submit(async move {
            let connection = inner.connection.get().await?;
            Ok(resolver.retrieve(&connection, &key).await?)
        })
    }

    /// Remove the `V` stored under `key`. Resolves to `true` whether or not a
    /// row existed.
    pub fn delete_async<V, K>(&self, key: &K) -> StorageResult<PendingOperation<bool>>
    where
        V: Send + Sync + 'static,
        K: 'static,
    {
        self.ensure_running()?;
        let key = self.inner.registry.require_key::<K>()?.serialize(key);
        let resolver = self.inner.registry.require_value::<V>()?;

        let inner = Arc::clone(&self.inner);
        self.inner.dispatcher.submit(async move {
            let connection = inner.connection.get().await?;
            resolver.delete(&connection, &key).await?;
            Ok(true)
        })
    }

    /// Rebuild a typed key from its stored string form.
    pub fn deserialize_key<K: 'static>(&self, raw: &str) -> StorageResult<K> {
        self.inner.registry.require_key::<K>()?.deserialize(raw)
    }

    /// Stop the pool and close the connection.
    ///
    /// New operations are rejected from the moment this is called. Queued
    /// operations still run, every worker is joined, and then the connection
    /// is closed through the provider. A close failure is returned as
    /// [`StorageError::Lifecycle`]; the workers are stopped either way.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> StorageResult<()> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Storage already shut down");
            return Ok(());
        }

        info!("Shutting down storage");
        self.inner.dispatcher.shutdown().await;
        self.inner.connection.close().await?;
        info!("Storage shutdown complete");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn workers(&self) -> usize {
        self.inner.dispatcher.size()
    }

    fn ensure_running(&self) -> StorageResult<()> {
        if self.is_shut_down() {
            return Err(StorageError::ShutDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::*;
    use crate::core::error::{DataAccessError, LifecycleError, TypeRole};
    use crate::core::key::NumberKeySerializer;
    use crate::memory::{JsonResolver, MemoryConnection, MemoryProvider, Operation};

    /// Equal when the UUIDs match, whatever the name.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Profile {
        uuid: Uuid,
        name: String,
    }

    impl Profile {
        fn new(name: &str) -> Self {
            Self {
                uuid: Uuid::new_v4(),
                name: name.to_string(),
            }
        }
    }

    impl PartialEq for Profile {
        fn eq(&self, other: &Self) -> bool {
            self.uuid == other.uuid
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note(String);

    struct Exploding;

    #[async_trait]
    impl ValueResolver<MemoryConnection> for Exploding {
        type Value = Note;

        async fn save(
            &self,
            _connection: &MemoryConnection,
            _key: &str,
            value: &Note,
        ) -> Result<(), DataAccessError> {
            if value.0 == "boom" {
                panic!("cannot store {}", value.0);
            }
            Ok(())
        }

        async fn retrieve(
            &self,
            _connection: &MemoryConnection,
            _key: &str,
        ) -> Result<Option<Note>, DataAccessError> {
            Ok(None)
        }

        async fn delete(
            &self,
            _connection: &MemoryConnection,
            _key: &str,
        ) -> Result<(), DataAccessError> {
            Ok(())
        }
    }

    async fn profile_storage(provider: MemoryProvider) -> StorageFacade<MemoryProvider> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        StorageBuilder::new(provider)
            .value_resolver(JsonResolver::<Profile>::new("player_profile"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn save_then_retrieve_returns_saved_value() {
        let storage = profile_storage(MemoryProvider::new()).await;
        let profile = Profile::new("Tofpu");

        let saved = storage
            .save_async(&profile.uuid, profile.clone())
            .unwrap()
            .await
            .unwrap();
        assert!(saved);

        let found: Option<Profile> = storage.retrieve_async(&profile.uuid).unwrap().await.unwrap();
        let found = found.expect("profile should exist");
        assert_eq!(found, profile);
        assert_eq!(found.name, "Tofpu");

        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn later_completed_save_replaces_earlier_one() {
        let storage = profile_storage(MemoryProvider::new()).await;
        let mut profile = Profile::new("Tofpu");

        storage.save_async(&profile.uuid, profile.clone()).unwrap().await.unwrap();
        profile.name = "Renamed".to_string();
        storage.save_async(&profile.uuid, profile.clone()).unwrap().await.unwrap();

        let found = storage
            .retrieve_async::<Profile, _>(&profile.uuid)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Renamed");
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn delete_removes_row_and_tolerates_missing_keys() {
        let storage = profile_storage(MemoryProvider::new()).await;
        let profile = Profile::new("Tofpu");

        storage.save_async(&profile.uuid, profile.clone()).unwrap().await.unwrap();
        assert!(storage.delete_async::<Profile, _>(&profile.uuid).unwrap().await.unwrap());

        let found = storage
            .retrieve_async::<Profile, _>(&profile.uuid)
            .unwrap()
            .await
            .unwrap();
        assert!(found.is_none());

        let never_saved = Uuid::new_v4();
        assert!(storage.delete_async::<Profile, _>(&never_saved).unwrap().await.unwrap());
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unregistered_types_fail_before_scheduling() {
        let provider = MemoryProvider::new();
        let observer = provider.clone();
        let storage = profile_storage(provider).await;
        let profile = Profile::new("Tofpu");

        let missing_key = storage.save_async(&42_i64, profile.clone());
        assert!(matches!(
            missing_key,
            Err(StorageError::UnregisteredType {
                role: TypeRole::Key,
                ..
            })
        ));

        // Exact type only: a string literal is not a `String`.
        let literal = storage.save_async(&"tofpu", profile.clone());
        assert!(matches!(literal, Err(StorageError::UnregisteredType { .. })));

        let missing_value = storage.save_async(&profile.uuid, Note("hi".into()));
        assert!(matches!(
            missing_value,
            Err(StorageError::UnregisteredType {
                role: TypeRole::Value,
                ..
            })
        ));

        assert!(storage.retrieve_async::<Note, _>(&profile.uuid).is_err());
        assert!(storage.delete_async::<Note, _>(&profile.uuid).is_err());
        assert!(storage.retrieve_async::<Profile, _>(&7_u8).is_err());

        storage.shutdown().await.unwrap();
        assert_eq!(observer.connects(), 0);
        assert_eq!(observer.connection().operations(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn builtin_key_serializers_are_always_available() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = profile_storage(provider).await;

        assert!(storage.registry().has_key::<String>());
        assert!(storage.registry().has_key::<Uuid>());

        let profile = Profile::new("Tofpu");
        storage.save_async(&profile.uuid, profile.clone()).unwrap().await.unwrap();
        storage
            .save_async(&"tofpu".to_string(), profile.clone())
            .unwrap()
            .await
            .unwrap();

        assert!(rows.get("player_profile", &profile.uuid.to_string()).unwrap().is_some());
        assert!(rows.get("player_profile", "tofpu").unwrap().is_some());
        assert_eq!(rows.len("player_profile"), 2);
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn registered_number_keys_round_trip() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = StorageBuilder::new(provider)
            .key_serializer(NumberKeySerializer::<i64>::new())
            .value_resolver(JsonResolver::<Note>::new("notes"))
            .build()
            .await
            .unwrap();

        storage.save_async(&42_i64, Note("answer".into())).unwrap().await.unwrap();
        assert!(rows.get("notes", "42").unwrap().is_some());

        let note: Option<Note> = storage.retrieve_async(&42_i64).unwrap().await.unwrap();
        assert_eq!(note, Some(Note("answer".into())));

        assert_eq!(storage.deserialize_key::<i64>("42").unwrap(), 42);
        assert!(matches!(
            storage.deserialize_key::<Uuid>("nope"),
            Err(StorageError::KeyDecode { .. })
        ));
        assert!(matches!(
            storage.deserialize_key::<i32>("42"),
            Err(StorageError::UnregisteredType { .. })
        ));
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_retrieves_see_whole_value_or_nothing() {
        let storage = profile_storage(MemoryProvider::new()).await;
        let profile = Profile::new("Tofpu");

        let save = storage.save_async(&profile.uuid, profile.clone()).unwrap();

        let readers: Vec<_> = (0..10)
            .map(|_| {
                let storage = storage.clone();
                let id = profile.uuid;
                tokio::spawn(async move { storage.retrieve_async::<Profile, _>(&id)?.await })
            })
            .collect();

        for reader in readers {
            match reader.await.unwrap() {
                Ok(Some(found)) => {
                    assert_eq!(found, profile);
                    assert_eq!(found.name, "Tofpu");
                }
                Ok(None) => {}
                Err(e) => panic!("retrieve failed during concurrent save: {}", e),
            }
        }

        assert!(save.await.unwrap());
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_failure_fails_the_future_once() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = profile_storage(provider).await;
        let profile = Profile::new("Tofpu");

        rows.set_failing(Operation::Write, true);
        let pending = storage.save_async(&profile.uuid, profile.clone()).unwrap();
        let err = pending.await.unwrap_err();
        assert!(err.is_data_access());
        assert_eq!(rows.operations(), 1);

        rows.set_failing(Operation::Write, false);
        let id = profile.uuid;
        assert!(storage.save_async(&id, profile).unwrap().await.unwrap());
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_failure_is_not_reported_as_absent() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = profile_storage(provider).await;

        rows.set_failing(Operation::Read, true);
        let result = storage
            .retrieve_async::<Profile, _>(&Uuid::new_v4())
            .unwrap()
            .await;
        assert!(matches!(result, Err(StorageError::DataAccess(_))));
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_resolver_leaves_pool_usable() {
        let storage = StorageBuilder::new(MemoryProvider::new())
            .workers(1)
            .value_resolver(Exploding)
            .value_resolver(JsonResolver::<Profile>::new("player_profile"))
            .build()
            .await
            .unwrap();

        let err = storage
            .save_async(&"k".to_string(), Note("boom".into()))
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.is_data_access());

        let profile = Profile::new("Tofpu");
        let id = profile.uuid;
        assert!(storage.save_async(&id, profile).unwrap().await.unwrap());
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connection_is_opened_lazily_and_once() {
        let provider = MemoryProvider::new();
        let observer = provider.clone();
        let storage = profile_storage(provider).await;
        assert_eq!(observer.connects(), 0);

        let profile = Profile::new("Tofpu");
        for _ in 0..5 {
            storage.save_async(&profile.uuid, profile.clone()).unwrap().await.unwrap();
        }
        storage.init().await.unwrap();

        assert_eq!(observer.connects(), 1);
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_failure_is_a_lifecycle_error() {
        let storage = profile_storage(MemoryProvider::new().refuse_connect()).await;
        assert!(storage.init().await.unwrap_err().is_lifecycle());

        let profile = Profile::new("Tofpu");
        let id = profile.uuid;
        let err = storage
            .save_async(&id, profile)
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.is_lifecycle());
        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_closes_connection_and_rejects_work() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = profile_storage(provider).await;

        storage.init().await.unwrap();
        storage.shutdown().await.unwrap();

        assert!(rows.is_closed());
        assert!(storage.is_shut_down());

        let profile = Profile::new("Tofpu");
        let id = profile.uuid;
        assert!(matches!(
            storage.save_async(&id, profile),
            Err(StorageError::ShutDown)
        ));
        assert!(matches!(storage.connection().await, Err(StorageError::ShutDown)));
        assert!(matches!(storage.init().await, Err(StorageError::ShutDown)));

        storage.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_runs_queued_operations_first() {
        let provider = MemoryProvider::new();
        let rows = provider.connection();
        let storage = StorageBuilder::new(provider)
            .workers(1)
            .value_resolver(JsonResolver::<Profile>::new("player_profile"))
            .build()
            .await
            .unwrap();

        let pending: Vec<_> = (0..20)
            .map(|i| {
                let profile = Profile::new(&format!("player-{}", i));
                let id = profile.uuid;
                storage.save_async(&id, profile).unwrap()
            })
            .collect();

        storage.shutdown().await.unwrap();

        for op in pending {
            assert!(op.await.unwrap());
        }
        assert_eq!(rows.len("player_profile"), 20);
        assert!(rows.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_failure_is_returned_after_workers_stop() {
        let storage = profile_storage(MemoryProvider::new().refuse_close()).await;
        storage.init().await.unwrap();

        let err = storage.shutdown().await.unwrap_err();
        assert!(matches!(err, StorageError::Lifecycle(LifecycleError::Close { .. })));
        assert!(storage.is_shut_down());
        assert!(storage.save_async(&"k".to_string(), Profile::new("x")).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_pool_configuration_is_rejected() {
        let result = StorageBuilder::new(MemoryProvider::new())
            .workers(0)
            .build()
            .await;
        assert!(matches!(result, Err(StorageError::Config(_))));

        let result = StorageBuilder::new(MemoryProvider::new())
            .queue_capacity(0)
            .build()
            .await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn storage_section_configures_the_pool() {
        let store = ConfigStore::parse("[storage]\nworkers = 3\n").unwrap();
        let storage = StorageBuilder::new(MemoryProvider::new())
            .config_store(&store)
            .unwrap()
            .build()
            .await
            .unwrap();

        assert_eq!(storage.workers(), 3);
        storage.shutdown().await.unwrap();
    }
}
