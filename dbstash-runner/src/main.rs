//! dbstash demo
//!
//! Stores, reads back and deletes a player profile in SQLite:
//! - Loads `[storage]` and `[sqlite]` from `config.toml` when present
//! - Runs every query on the storage worker pool
//! - Shuts the pool down and closes the database before exiting

mod profile;
mod sqlite;

use anyhow::Result;
use dbstash::prelude::*;
use tracing::{Level, info};
use uuid::Uuid;

use crate::profile::{PlayerProfile, PlayerProfileResolver};
use crate::sqlite::{SqliteConfig, SqliteProvider};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting dbstash demo...");

    // Load config file if exists
    let store = if std::path::Path::new("config.toml").exists() {
        info!("Loading config.toml");
        ConfigStore::from_file("config.toml")?
    } else {
        ConfigStore::empty()
    };

    let sqlite: SqliteConfig = store.get()?;
    let storage = StorageBuilder::new(SqliteProvider::new(sqlite))
        .config_store(&store)?
        .value_resolver(PlayerProfileResolver)
        .build()
        .await?;
    storage.init().await?;

    let profile = PlayerProfile::new(Uuid::new_v4(), "Tofpu");
    storage.save_async(&profile.uuid, profile.clone())?.await?;
    info!("Saved {} ({})", profile.name, profile.uuid);

    let found = storage
        .retrieve_async::<PlayerProfile, _>(&profile.uuid)?
        .await?;
    match &found {
        Some(found) => info!("Retrieved {} ({})", found.name, found.uuid),
        None => info!("Profile {} not found", profile.uuid),
    }

    storage
        .delete_async::<PlayerProfile, _>(&profile.uuid)?
        .await?;
    let after = storage
        .retrieve_async::<PlayerProfile, _>(&profile.uuid)?
        .await?;
    info!("After delete present: {}", after.is_some());

    storage.shutdown().await?;
    info!("Goodbye");

    Ok(())
}
