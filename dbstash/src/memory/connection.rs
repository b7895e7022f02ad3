use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::core::connection::ConnectionProvider;
use crate::core::error::{BoxError, DataAccessError};

/// Kind of row access, used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Write => f.write_str("write"),
            Operation::Read => f.write_str("read"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Default)]
struct Faults {
    write: AtomicBool,
    read: AtomicBool,
    delete: AtomicBool,
}

impl Faults {
    fn flag(&self, op: Operation) -> &AtomicBool {
        match op {
            Operation::Write => &self.write,
            Operation::Read => &self.read,
            Operation::Delete => &self.delete,
        }
    }
}

#[derive(Default)]
struct State {
    /// (table, key) -> row
    rows: DashMap<(String, String), Value>,
    faults: Faults,
    closed: AtomicBool,
    operations: AtomicU64,
}

/// Thread-safe in-memory table store.
///
/// Cloning yields another handle to the same rows, so tests can keep a handle
/// while the facade owns the connection.
#[derive(Clone, Default)]
pub struct MemoryConnection {
    state: Arc<State>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub fn put(&self, table: &str, key: &str, row: Value) -> Result<(), DataAccessError> {
        self.check(Operation::Write)?;
        self.state
            .rows
            .insert((table.to_string(), key.to_string()), row);
        Ok(())
    }

    pub fn get(&self, table: &str, key: &str) -> Result<Option<Value>, DataAccessError> {
        self.check(Operation::Read)?;
        Ok(self
            .state
            .rows
            .get(&(table.to_string(), key.to_string()))
            .map(|row| row.value().clone()))
    }

    /// Remove a row. Returns whether it existed.
    pub fn remove(&self, table: &str, key: &str) -> Result<bool, DataAccessError> {
        self.check(Operation::Delete)?;
        Ok(self
            .state
            .rows
            .remove(&(table.to_string(), key.to_string()))
            .is_some())
    }

    /// Number of rows in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.state
            .rows
            .iter()
            .filter(|entry| entry.key().0 == table)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.state.rows.is_empty()
    }

    /// Make every `op` fail until switched off.
    pub fn set_failing(&self, op: Operation, failing: bool) {
        self.state.faults.flag(op).store(failing, Ordering::SeqCst);
    }

    /// Row accesses attempted so far, including failed ones.
    pub fn operations(&self) -> u64 {
        self.state.operations.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn check(&self, op: Operation) -> Result<(), DataAccessError> {
        self.state.operations.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(DataAccessError::new(format!(
                "{} on a closed memory connection",
                op
            )));
        }
        if self.state.faults.flag(op).load(Ordering::SeqCst) {
            return Err(DataAccessError::new(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

/// Provider handing out a [`MemoryConnection`].
///
/// Clones share the rows and the connect counter.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    connection: MemoryConnection,
    connects: Arc<AtomicUsize>,
    refuse_connect: bool,
    refuse_close: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(connection: MemoryConnection) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    /// Fail every `connect` call.
    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Fail the `close` call made during shutdown.
    pub fn refuse_close(mut self) -> Self {
        self.refuse_close = true;
        self
    }

    /// Another handle to the rows this provider serves.
    pub fn connection(&self) -> MemoryConnection {
        self.connection.clone()
    }

    /// Successful `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for MemoryProvider {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, BoxError> {
        if self.refuse_connect {
            return Err("memory store refused the connection".into());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.connection.clone())
    }

    async fn close(&self, connection: Arc<MemoryConnection>) -> Result<(), BoxError> {
        if self.refuse_close {
            return Err("memory store refused to close".into());
        }
        connection.close();
        Ok(())
    }
}
