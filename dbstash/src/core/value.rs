use async_trait::async_trait;

use crate::core::error::DataAccessError;

/// Type-specific persistence for one domain value type.
///
/// Every method receives the connection the facade holds at call time and a
/// key that has already been serialized.
///
/// Contract:
/// - `retrieve` returns `Ok(None)` only when no row matches. Read failures
///   must be reported as errors, never folded into `None`.
/// - `delete` of a missing key succeeds.
#[async_trait]
pub trait ValueResolver<C>: Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    type Value: Send + Sync + 'static;

    async fn save(&self, connection: &C, key: &str, value: &Self::Value)
    -> Result<(), DataAccessError>;

    async fn retrieve(&self, connection: &C, key: &str)
    -> Result<Option<Self::Value>, DataAccessError>;

    async fn delete(&self, connection: &C, key: &str) -> Result<(), DataAccessError>;
}
