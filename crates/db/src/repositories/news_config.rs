use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::error;

use brobot_core::news::{ChannelConfig, ChannelConfigUpdate, NewChannelConfig, NewsCategory};

use super::user::parse_timestamp;
use super::{NewsConfigRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNewsConfigRepository {
    pool: DbPool,
}

impl SqlNewsConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn encode_categories(categories: &[NewsCategory]) -> String {
    categories.iter().map(|category| category.as_str()).collect::<Vec<_>>().join(",")
}

pub(crate) fn decode_categories(value: &str) -> Vec<NewsCategory> {
    value.split(',').filter_map(NewsCategory::parse).collect()
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<ChannelConfig, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_id: String =
        row.try_get("channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let categories_str: String =
        row.try_get("categories").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let create_threads: i64 =
        row.try_get("create_threads").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let add_reactions: i64 =
        row.try_get("add_reactions").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_per_hour: i64 =
        row.try_get("max_per_hour").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let enabled: i64 =
        row.try_get("enabled").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ChannelConfig {
        id,
        channel_id,
        categories: decode_categories(&categories_str),
        create_threads: create_threads != 0,
        add_reactions: add_reactions != 0,
        max_per_hour: max_per_hour.clamp(1, 10) as u8,
        enabled: enabled != 0,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

const CONFIG_COLUMNS: &str = "id, channel_id, categories, create_threads, add_reactions, \
                              max_per_hour, enabled, created_at, updated_at";

#[async_trait]
impl NewsConfigRepository for SqlNewsConfigRepository {
    async fn create(&self, config: NewChannelConfig) -> Result<ChannelConfig, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(&format!(
            "INSERT INTO news_channel_configs \
                 (channel_id, categories, create_threads, add_reactions, max_per_hour, enabled, \
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {CONFIG_COLUMNS}",
        ))
        .bind(&config.channel_id)
        .bind(encode_categories(&config.categories))
        .bind(i64::from(config.create_threads))
        .bind(i64::from(config.add_reactions))
        .bind(i64::from(config.max_per_hour))
        .bind(i64::from(config.enabled))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                return RepositoryError::ConfigAlreadyExists {
                    channel_id: config.channel_id.clone(),
                };
            }
            error!(
                operation = "news_config.create",
                channel_id = %config.channel_id,
                error = %e,
                "config insert failed"
            );
            RepositoryError::from(e)
        })?;

        row_to_config(&row)
    }

    async fn get(&self, channel_id: &str) -> Result<Option<ChannelConfig>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM news_channel_configs WHERE channel_id = ?",
        ))
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "news_config.get", channel_id, error = %e, "config query failed");
            RepositoryError::from(e)
        })?;

        match row {
            Some(ref row) => Ok(Some(row_to_config(row)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        channel_id: &str,
        update: ChannelConfigUpdate,
    ) -> Result<ChannelConfig, RepositoryError> {
        let existing = self.get(channel_id).await?.ok_or_else(|| {
            RepositoryError::ConfigNotFound { channel_id: channel_id.to_owned() }
        })?;

        let categories = update.categories.unwrap_or(existing.categories);
        let create_threads = update.create_threads.unwrap_or(existing.create_threads);
        let add_reactions = update.add_reactions.unwrap_or(existing.add_reactions);
        let max_per_hour = update.max_per_hour.unwrap_or(existing.max_per_hour);
        let enabled = update.enabled.unwrap_or(existing.enabled);

        let row = sqlx::query(&format!(
            "UPDATE news_channel_configs
             SET categories = ?, create_threads = ?, add_reactions = ?, max_per_hour = ?,
                 enabled = ?, updated_at = ?
             WHERE channel_id = ?
             RETURNING {CONFIG_COLUMNS}",
        ))
        .bind(encode_categories(&categories))
        .bind(i64::from(create_threads))
        .bind(i64::from(add_reactions))
        .bind(i64::from(max_per_hour))
        .bind(i64::from(enabled))
        .bind(Utc::now().to_rfc3339())
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "news_config.update", channel_id, error = %e, "config update failed");
            RepositoryError::from(e)
        })?;

        row_to_config(&row)
    }

    async fn delete(&self, channel_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM news_channel_configs WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    operation = "news_config.delete",
                    channel_id,
                    error = %e,
                    "config delete failed"
                );
                RepositoryError::from(e)
            })?;

        Ok(())
    }

    async fn list_enabled(&self) -> Result<Vec<ChannelConfig>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM news_channel_configs WHERE enabled = 1 ORDER BY id",
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "news_config.list_enabled", error = %e, "config query failed");
            RepositoryError::from(e)
        })?;

        rows.iter().map(row_to_config).collect()
    }
}
