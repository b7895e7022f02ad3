//! Immutable type -> handler lookup tables.
//!
//! Dispatch is by exact [`TypeId`]: a key of type `&'static str` does not
//! match the `String` serializer, and a newtype around a registered value
//! type is a miss.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::error::{StorageError, StorageResult};
use crate::core::key::{KeySerializer, StringKeySerializer, UuidKeySerializer};
use crate::core::value::ValueResolver;

/// Shared handle to a registered key serializer.
pub type KeyHandle<K> = Arc<dyn KeySerializer<Key = K>>;

/// Shared handle to a registered value resolver.
pub type ValueHandle<C, V> = Arc<dyn ValueResolver<C, Value = V>>;

/// A registered handler with its type erased.
///
/// `handler` holds a `KeyHandle<K>` or `ValueHandle<C, V>` for the type the
/// entry is filed under.
struct Entry {
    type_name: &'static str,
    handler: Box<dyn Any + Send + Sync>,
}

impl Entry {
    fn new<H: Send + Sync + 'static>(type_name: &'static str, handler: H) -> Self {
        Self {
            type_name,
            handler: Box::new(handler),
        }
    }
}

/// Lookup tables for key serializers and value resolvers.
///
/// Built once by [`RegistryBuilder`] and never mutated afterwards.
pub struct Registry<C> {
    keys: HashMap<TypeId, Entry>,
    values: HashMap<TypeId, Entry>,
    _connection: PhantomData<fn() -> C>,
}

impl<C> Registry<C>
where
    C: Send + Sync + 'static,
{
    pub fn builder() -> RegistryBuilder<C> {
        RegistryBuilder::new()
    }

    /// Serializer registered for exactly `K`.
    pub fn key_serializer<K: 'static>(&self) -> Option<KeyHandle<K>> {
        self.keys
            .get(&TypeId::of::<K>())
            .and_then(|e| e.handler.downcast_ref::<KeyHandle<K>>())
            .cloned()
    }

    /// Resolver registered for exactly `V`.
    pub fn value_resolver<V: Send + Sync + 'static>(&self) -> Option<ValueHandle<C, V>> {
        self.values
            .get(&TypeId::of::<V>())
            .and_then(|e| e.handler.downcast_ref::<ValueHandle<C, V>>())
            .cloned()
    }

    pub(crate) fn require_key<K: 'static>(&self) -> StorageResult<KeyHandle<K>> {
        self.key_serializer::<K>()
            .ok_or_else(StorageError::unregistered_key::<K>)
    }

    pub(crate) fn require_value<V: Send + Sync + 'static>(
        &self,
    ) -> StorageResult<ValueHandle<C, V>> {
        self.value_resolver::<V>()
            .ok_or_else(StorageError::unregistered_value::<V>)
    }

    pub fn has_key<K: 'static>(&self) -> bool {
        self.keys.contains_key(&TypeId::of::<K>())
    }

    pub fn has_value<V: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<V>())
    }

    /// Registered key type names, sorted.
    pub fn key_types(&self) -> Vec<&'static str> {
        sorted_names(&self.keys)
    }

    /// Registered value type names, sorted.
    pub fn value_types(&self) -> Vec<&'static str> {
        sorted_names(&self.values)
    }
}

fn sorted_names(entries: &HashMap<TypeId, Entry>) -> Vec<&'static str> {
    let mut names: Vec<_> = entries.values().map(|e| e.type_name).collect();
    names.sort_unstable();
    names
}

/// Collects handlers in registration order and produces a [`Registry`].
///
/// Later registrations for the same type replace earlier ones. The built-in
/// `String` and `Uuid` serializers are installed last, so they replace any
/// application serializer for those two types.
pub struct RegistryBuilder<C> {
    keys: Vec<(TypeId, Entry)>,
    values: Vec<(TypeId, Entry)>,
    _connection: PhantomData<fn() -> C>,
}

impl<C> Default for RegistryBuilder<C>
where
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RegistryBuilder<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            _connection: PhantomData,
        }
    }

    pub fn key_serializer<S: KeySerializer>(mut self, serializer: S) -> Self {
        self.push_key(serializer);
        self
    }

    pub fn value_resolver<R: ValueResolver<C>>(mut self, resolver: R) -> Self {
        self.push_value(resolver);
        self
    }

    pub(crate) fn push_key<S: KeySerializer>(&mut self, serializer: S) {
        let handle: KeyHandle<S::Key> = Arc::new(serializer);
        self.keys.push((
            TypeId::of::<S::Key>(),
            Entry::new(type_name::<S::Key>(), handle),
        ));
    }

    pub(crate) fn push_value<R: ValueResolver<C>>(&mut self, resolver: R) {
        let handle: ValueHandle<C, R::Value> = Arc::new(resolver);
        self.values.push((
            TypeId::of::<R::Value>(),
            Entry::new(type_name::<R::Value>(), handle),
        ));
    }

    pub fn build(self) -> Registry<C> {
        let mut keys = HashMap::with_capacity(self.keys.len() + 2);
        for (id, entry) in self.keys {
            insert_entry(&mut keys, id, entry, "key serializer");
        }

        for (id, entry) in builtin_keys() {
            if let Some(previous) = keys.insert(id, entry) {
                debug!(
                    "Built-in key serializer replaces application serializer for {}",
                    previous.type_name
                );
            }
        }

        let mut values = HashMap::with_capacity(self.values.len());
        for (id, entry) in self.values {
            insert_entry(&mut values, id, entry, "value resolver");
        }

        debug!(
            keys = keys.len(),
            values = values.len(),
            "Storage registry built"
        );

        Registry {
            keys,
            values,
            _connection: PhantomData,
        }
    }
}

fn insert_entry(map: &mut HashMap<TypeId, Entry>, id: TypeId, entry: Entry, kind: &str) {
    let name = entry.type_name;
    if map.insert(id, entry).is_some() {
        warn!("Duplicate {} for {}, keeping the later registration", kind, name);
    } else {
        debug!("Registered {} for {}", kind, name);
    }
}

fn builtin_keys() -> [(TypeId, Entry); 2] {
    let string: KeyHandle<String> = Arc::new(StringKeySerializer);
    let uuid: KeyHandle<uuid::Uuid> = Arc::new(UuidKeySerializer);
    [
        (
            TypeId::of::<String>(),
            Entry::new(type_name::<String>(), string),
        ),
        (
            TypeId::of::<uuid::Uuid>(),
            Entry::new(type_name::<uuid::Uuid>(), uuid),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::core::error::DataAccessError;
    use crate::core::key::NumberKeySerializer;

    struct Shouting;

    impl KeySerializer for Shouting {
        type Key = String;

        fn serialize(&self, key: &String) -> String {
            key.to_uppercase()
        }
    }

    struct Tagged(&'static str);

    impl KeySerializer for Tagged {
        type Key = u16;

        fn serialize(&self, key: &u16) -> String {
            format!("{}-{}", self.0, key)
        }
    }

    struct Widget;

    struct WidgetResolver;

    #[async_trait]
    impl ValueResolver<()> for WidgetResolver {
        type Value = Widget;

        async fn save(
            &self,
            _connection: &(),
            _key: &str,
            _value: &Widget,
        ) -> Result<(), DataAccessError> {
            Ok(())
        }

        async fn retrieve(
            &self,
            _connection: &(),
            _key: &str,
        ) -> Result<Option<Widget>, DataAccessError> {
            Ok(None)
        }

        async fn delete(&self, _connection: &(), _key: &str) -> Result<(), DataAccessError> {
            Ok(())
        }
    }

    #[test]
    fn builtins_present_without_registrations() {
        let registry = Registry::<()>::builder().build();

        assert!(registry.has_key::<String>());
        assert!(registry.has_key::<Uuid>());
        assert_eq!(registry.key_types().len(), 2);
        assert!(registry.value_types().is_empty());

        let id = Uuid::new_v4();
        let serializer = registry.key_serializer::<Uuid>().unwrap();
        assert_eq!(serializer.serialize(&id), id.to_string());
    }

    #[test]
    fn builtin_string_serializer_wins() {
        let registry = Registry::<()>::builder()
            .key_serializer(Shouting)
            .build();

        let serializer = registry.key_serializer::<String>().unwrap();
        assert_eq!(serializer.serialize(&"quiet".to_string()), "quiet");
    }

    #[test]
    fn later_application_registration_wins() {
        let registry = Registry::<()>::builder()
            .key_serializer(Tagged("first"))
            .key_serializer(Tagged("second"))
            .build();

        let serializer = registry.key_serializer::<u16>().unwrap();
        assert_eq!(serializer.serialize(&7), "second-7");
    }

    #[test]
    fn lookup_is_exact_type_only() {
        let registry = Registry::<()>::builder()
            .key_serializer(NumberKeySerializer::<i64>::new())
            .value_resolver(WidgetResolver)
            .build();

        assert!(registry.has_key::<i64>());
        assert!(!registry.has_key::<i32>());
        assert!(!registry.has_key::<&'static str>());
        assert!(registry.value_resolver::<Widget>().is_some());
        assert!(registry.value_resolver::<Box<Widget>>().is_none());

        let err = registry.require_value::<String>().err().unwrap();
        assert!(err.is_unregistered());
    }
}
