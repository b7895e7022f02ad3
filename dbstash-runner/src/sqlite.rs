//! SQLite connection provider for the demo binary.

use std::sync::Arc;

use async_trait::async_trait;
use dbstash::prelude::*;
use serde::Deserialize;
use sqlx::{Connection, SqliteConnection};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};

/// A single SQLite connection shared by the storage workers.
///
/// `SqliteConnection` needs `&mut` for every query, so workers take turns.
/// Closing empties the slot, so handles still held elsewhere see a closed
/// connection instead of a live one.
pub struct SqliteHandle {
    connection: Mutex<Option<SqliteConnection>>,
}

impl SqliteHandle {
    fn new(connection: SqliteConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
        }
    }

    /// Exclusive access to the open connection.
    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>, DataAccessError> {
        MutexGuard::try_map(self.connection.lock().await, |slot| slot.as_mut())
            .map_err(|_| DataAccessError::new("SQLite connection is closed"))
    }

    #[cfg(test)]
    async fn is_closed(&self) -> bool {
        self.connection.lock().await.is_none()
    }

    async fn close(&self) -> Result<(), sqlx::Error> {
        let connection = self.connection.lock().await.take();
        match connection {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

/// `[sqlite]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

fn default_url() -> String {
    "sqlite://dbstash.db?mode=rwc".to_string()
}

impl Configurable for SqliteConfig {
    const PREFIX: &'static str = "sqlite";
}

pub struct SqliteProvider {
    config: SqliteConfig,
}

impl SqliteProvider {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    type Connection = SqliteHandle;

    async fn connect(&self) -> Result<SqliteHandle, BoxError> {
        info!("Opening SQLite database: {}", self.config.url);
        let mut connection = SqliteConnection::connect(&self.config.url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_profile (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut connection)
        .await?;
        debug!("Schema ready");

        Ok(SqliteHandle::new(connection))
    }

    async fn close(&self, connection: Arc<SqliteHandle>) -> Result<(), BoxError> {
        connection.close().await?;
        debug!("SQLite connection closed");
        Ok(())
    }
}
