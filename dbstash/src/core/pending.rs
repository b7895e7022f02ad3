use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::core::error::{StorageError, StorageResult};

/// Result handle for one scheduled save, retrieve or delete.
///
/// Resolves exactly once. Dropping it does not cancel the operation; the
/// worker still runs it to completion.
#[must_use = "a pending operation reports failures only when awaited"]
pub struct PendingOperation<T> {
    receiver: oneshot::Receiver<StorageResult<T>>,
}

impl<T> PendingOperation<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<StorageResult<T>>) -> Self {
        Self { receiver }
    }

    /// Take the outcome if it is already available.
    ///
    /// Consumes the handle once the outcome is in. While the operation is
    /// still queued or running the handle is given back unchanged.
    pub fn try_take(mut self) -> Result<StorageResult<T>, Self> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(oneshot::error::TryRecvError::Empty) => Err(self),
            Err(oneshot::error::TryRecvError::Closed) => Ok(Err(StorageError::ShutDown)),
        }
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = StorageResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender only disappears without a value if the job was dropped
        // unrun, which happens when the runtime itself is torn down.
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(StorageError::ShutDown)))
    }
}
