use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::error;

use brobot_core::review::User;

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let discord_id: String =
        row.try_get("discord_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let username: String =
        row.try_get("username").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User { id, discord_id, username, created_at: parse_timestamp(&created_at_str) })
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_or_create(
        &self,
        discord_id: &str,
        username: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO users (discord_id, username, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(discord_id) DO UPDATE SET username = excluded.username
             RETURNING id, discord_id, username, created_at",
        )
        .bind(discord_id)
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "user.find_or_create", discord_id, error = %e, "user upsert failed");
            RepositoryError::from(e)
        })?;

        row_to_user(&row)
    }
}
