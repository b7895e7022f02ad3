//! Connection provider contract and the facade's single shared connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::error::{BoxError, LifecycleError, StorageError, StorageResult};

/// Opens and closes the backing store connection.
///
/// The connection is shared by every worker, so it must be `Send + Sync`.
/// Stores whose native handle cannot be used from several tasks at once
/// should wrap it (for example in `tokio::sync::Mutex`) to serialize access.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Open a connection. Called lazily on first use, or by `init`.
    async fn connect(&self) -> Result<Self::Connection, BoxError>;

    /// Release the connection during shutdown.
    ///
    /// Workers have been joined by the time this runs. The default drops it.
    async fn close(&self, connection: Arc<Self::Connection>) -> Result<(), BoxError> {
        drop(connection);
        Ok(())
    }
}

enum SlotState<C> {
    Idle,
    Open(Arc<C>),
    Closed,
}

/// Lazily-established connection owned by the facade.
///
/// Once closed it stays closed: later access returns
/// [`StorageError::ShutDown`] instead of reconnecting.
pub(crate) struct ConnectionSlot<P: ConnectionProvider> {
    provider: P,
    state: RwLock<SlotState<P::Connection>>,
}

impl<P: ConnectionProvider> ConnectionSlot<P> {
    pub(crate) fn new(provider: P) -> Self {
        Self {
            provider,
            state: RwLock::new(SlotState::Idle),
        }
    }

    /// Current connection, opening it on first use.
    pub(crate) async fn get(&self) -> StorageResult<Arc<P::Connection>> {
        {
            let state = self.state.read().await;
            match &*state {
                SlotState::Open(connection) => return Ok(Arc::clone(connection)),
                SlotState::Closed => return Err(StorageError::ShutDown),
                SlotState::Idle => {}
            }
        }

        let mut state = self.state.write().await;
        match &*state {
            SlotState::Open(connection) => Ok(Arc::clone(connection)),
            SlotState::Closed => Err(StorageError::ShutDown),
            SlotState::Idle => {
                let connection = self
                    .provider
                    .connect()
                    .await
                    .map(Arc::new)
                    .map_err(LifecycleError::connect)?;
                debug!("Storage connection established");
                *state = SlotState::Open(Arc::clone(&connection));
                Ok(connection)
            }
        }
    }

    pub(crate) async fn is_open(&self) -> bool {
        matches!(&*self.state.read().await, SlotState::Open(_))
    }

    /// Close the connection if one was opened. Idempotent.
    pub(crate) async fn close(&self) -> StorageResult<()> {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, SlotState::Closed)
        };

        if let SlotState::Open(connection) = previous {
            self.provider
                .close(connection)
                .await
                .map_err(LifecycleError::close)?;
            debug!("Storage connection closed");
        }

        Ok(())
    }
}
