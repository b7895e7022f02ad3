//! Fixed-size worker pool that runs storage operations off the caller's task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::core::error::{DataAccessError, StorageError, StorageResult};
use crate::core::pending::PendingOperation;

type Job = BoxFuture<'static, ()>;

/// Worker pool consuming jobs from a bounded MPMC queue.
///
/// Jobs are independent; nothing orders two jobs for the same key.
pub struct Dispatcher {
    sender: Mutex<Option<flume::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    capacity: usize,
}

impl Dispatcher {
    /// Spawn `size` workers onto the current Tokio runtime.
    pub fn new(size: usize, capacity: usize) -> Self {
        let (sender, receiver) = flume::bounded::<Job>(capacity);

        let workers = (0..size)
            .map(|worker_id| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    trace!(worker_id, "Storage worker starting");
                    // Ends once every sender is gone and the queue is drained.
                    while let Ok(job) = receiver.recv_async().await {
                        job.await;
                    }
                    trace!(worker_id, "Storage worker stopped");
                })
            })
            .collect();

        debug!(workers = size, capacity, "Storage dispatcher started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
            capacity,
        }
    }

    /// Queue `task` and return a handle to its outcome.
    ///
    /// Never waits: a full queue yields [`StorageError::Saturated`], a stopped
    /// pool [`StorageError::ShutDown`]. A panic inside `task` completes the
    /// handle with a data access error and leaves the worker running.
    pub fn submit<T, F>(&self, task: F) -> StorageResult<PendingOperation<T>>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked(panic).into()));
            // The caller may have dropped the handle.
            let _ = tx.send(outcome);
        }
        .boxed();

        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(StorageError::ShutDown)?;
        sender.try_send(job).map_err(|e| match e {
            flume::TrySendError::Full(_) => StorageError::Saturated {
                capacity: self.capacity,
            },
            flume::TrySendError::Disconnected(_) => StorageError::ShutDown,
        })?;

        Ok(PendingOperation::new(rx))
    }

    /// Stop accepting work, let queued jobs finish, and join every worker.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(worker_id, "Storage worker ended abnormally: {}", e);
            }
        }

        debug!("Storage dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, |s| s.len())
    }
}

fn panicked(panic: Box<dyn Any + Send>) -> DataAccessError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DataAccessError::new(format!("storage operation panicked: {}", message))
}
