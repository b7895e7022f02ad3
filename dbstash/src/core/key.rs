//! Key serializers: typed key <-> row identifier string.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use uuid::Uuid;

use crate::core::error::{StorageError, StorageResult};

/// Converts a typed key into the string form used as a row identifier.
///
/// `serialize` must be total for `Key`. `deserialize` is optional; the default
/// reports that reconstruction is unsupported.
///
/// # Example
///
/// ```ignore
/// use dbstash::core::KeySerializer;
///
/// pub struct SkuSerializer;
///
/// impl KeySerializer for SkuSerializer {
///     type Key = Sku;
///
///     fn serialize(&self, key: &Sku) -> String {
///         key.code().to_string()
///     }
/// }
/// ```
pub trait KeySerializer: Send + Sync + 'static {
    type Key: 'static;

    fn serialize(&self, key: &Self::Key) -> String;

    fn deserialize(&self, raw: &str) -> StorageResult<Self::Key> {
        Err(StorageError::key_decode::<Self::Key>(
            raw,
            "deserialization is not supported for this key type",
        ))
    }
}

/// Identity serializer for `String` keys. Always installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringKeySerializer;

impl KeySerializer for StringKeySerializer {
    type Key = String;

    fn serialize(&self, key: &String) -> String {
        key.clone()
    }

    fn deserialize(&self, raw: &str) -> StorageResult<String> {
        Ok(raw.to_string())
    }
}

/// Canonical hyphenated text form for `Uuid` keys. Always installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeySerializer;

impl KeySerializer for UuidKeySerializer {
    type Key = Uuid;

    fn serialize(&self, key: &Uuid) -> String {
        key.hyphenated().to_string()
    }

    fn deserialize(&self, raw: &str) -> StorageResult<Uuid> {
        Uuid::parse_str(raw).map_err(|e| StorageError::key_decode::<Uuid>(raw, e))
    }
}

/// Serializer for numeric keys (`Display` out, `FromStr` back).
///
/// Not installed by default. Dispatch is by exact type, so register one per
/// numeric type in use:
///
/// ```ignore
/// builder
///     .key_serializer(NumberKeySerializer::<i64>::new())
///     .key_serializer(NumberKeySerializer::<u32>::new());
/// ```
pub struct NumberKeySerializer<N> {
    _number: PhantomData<fn() -> N>,
}

impl<N> NumberKeySerializer<N> {
    pub fn new() -> Self {
        Self {
            _number: PhantomData,
        }
    }
}

impl<N> Default for NumberKeySerializer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> KeySerializer for NumberKeySerializer<N>
where
    N: Display + FromStr + 'static,
    N::Err: Display,
{
    type Key = N;

    fn serialize(&self, key: &N) -> String {
        key.to_string()
    }

    fn deserialize(&self, raw: &str) -> StorageResult<N> {
        raw.parse::<N>()
            .map_err(|e| StorageError::key_decode::<N>(raw, e))
    }
}
