//! Player profiles stored in the `player_profile` table.

use async_trait::async_trait;
use dbstash::prelude::*;
use sqlx::Row;
use uuid::Uuid;

use crate::sqlite::SqliteHandle;

/// Two profiles are the same player when their UUIDs match.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub uuid: Uuid,
    pub name: String,
}

impl PlayerProfile {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }
}

impl PartialEq for PlayerProfile {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for PlayerProfile {}

pub struct PlayerProfileResolver;

#[async_trait]
impl ValueResolver<SqliteHandle> for PlayerProfileResolver {
    type Value = PlayerProfile;

    async fn save(
        &self,
        connection: &SqliteHandle,
        key: &str,
        value: &PlayerProfile,
    ) -> Result<(), DataAccessError> {
        sqlx::query("INSERT OR REPLACE INTO player_profile (id, name) VALUES (?, ?)")
            .bind(key)
            .bind(&value.name)
            .execute(&mut *connection.lock().await?)
            .await
            .map_err(|e| DataAccessError::with_source("failed to save player profile", e))?;
        Ok(())
    }

    async fn retrieve(
        &self,
        connection: &SqliteHandle,
        key: &str,
    ) -> Result<Option<PlayerProfile>, DataAccessError> {
        let row = sqlx::query("SELECT id, name FROM player_profile WHERE id = ?")
            .bind(key)
            .fetch_optional(&mut *connection.lock().await?)
            .await
            .map_err(|e| DataAccessError::with_source("failed to load player profile", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row
            .try_get("id")
            .map_err(|e| DataAccessError::with_source("player_profile.id unreadable", e))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| DataAccessError::with_source("player_profile.name unreadable", e))?;
        let uuid = Uuid::parse_str(&id).map_err(|e| {
            DataAccessError::with_source(format!("player_profile.id `{}` is not a UUID", id), e)
        })?;

        Ok(Some(PlayerProfile { uuid, name }))
    }

    async fn delete(&self, connection: &SqliteHandle, key: &str) -> Result<(), DataAccessError> {
        sqlx::query("DELETE FROM player_profile WHERE id = ?")
            .bind(key)
            .execute(&mut *connection.lock().await?)
            .await
            .map_err(|e| DataAccessError::with_source("failed to delete player profile", e))?;
        Ok(())
    }
}
