use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::DataAccessError;
use crate::core::value::ValueResolver;
use crate::memory::connection::MemoryConnection;

/// Stores any serde value as JSON in one table of a [`MemoryConnection`].
///
/// A row that no longer decodes as `V` is reported as a data access error,
/// not as an absent row.
pub struct JsonResolver<V> {
    table: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonResolver<V> {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            _value: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl<V> ValueResolver<MemoryConnection> for JsonResolver<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = V;

    async fn save(
        &self,
        connection: &MemoryConnection,
        key: &str,
        value: &V,
    ) -> Result<(), DataAccessError> {
        let row = serde_json::to_value(value).map_err(|e| {
            DataAccessError::with_source(format!("failed to encode `{}` row", self.table), e)
        })?;
        connection.put(&self.table, key, row)
    }

    async fn retrieve(
        &self,
        connection: &MemoryConnection,
        key: &str,
    ) -> Result<Option<V>, DataAccessError> {
        connection
            .get(&self.table, key)?
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    DataAccessError::with_source(
                        format!("failed to decode `{}` row for key {}", self.table, key),
                        e,
                    )
                })
            })
            .transpose()
    }

    async fn delete(&self, connection: &MemoryConnection, key: &str) -> Result<(), DataAccessError> {
        connection.remove(&self.table, key).map(|_| ())
    }
}
