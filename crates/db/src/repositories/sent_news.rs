use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::error;

use brobot_core::news::SentNewsItem;

use super::{RepositoryError, SentNewsRepository};
use crate::DbPool;

pub struct SqlSentNewsRepository {
    pool: DbPool,
}

impl SqlSentNewsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SentNewsRepository for SqlSentNewsRepository {
    async fn record(&self, item: SentNewsItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sent_news_items \
                 (external_id, channel_id, title, description, url, published_at, source, \
                  category, image_url, author, message_id, thread_id, sent_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.item.external_id)
        .bind(&item.channel_id)
        .bind(&item.item.title)
        .bind(&item.item.description)
        .bind(&item.item.url)
        .bind(item.item.published_at.to_rfc3339())
        .bind(&item.item.source)
        .bind(item.item.category.as_str())
        .bind(&item.item.image_url)
        .bind(&item.item.author)
        .bind(&item.message_id)
        .bind(&item.thread_id)
        .bind(item.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                operation = "sent_news.record",
                external_id = %item.item.external_id,
                channel_id = %item.channel_id,
                error = %e,
                "delivery record insert failed"
            );
            RepositoryError::from(e)
        })?;

        Ok(())
    }

    async fn already_sent_ids(
        &self,
        external_ids: &[String],
        channel_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; external_ids.len()].join(", ");
        let sql = format!(
            "SELECT external_id FROM sent_news_items \
             WHERE channel_id = ? AND external_id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(channel_id);
        for external_id in external_ids {
            query = query.bind(external_id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            error!(
                operation = "sent_news.already_sent_ids",
                channel_id,
                error = %e,
                "dedup lookup failed"
            );
            RepositoryError::from(e)
        })?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("external_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn count_sent_since(
        &self,
        channel_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sent_news_items WHERE channel_id = ? AND sent_at > ?",
        )
        .bind(channel_id)
        .bind(cutoff.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                operation = "sent_news.count_sent_since",
                channel_id,
                error = %e,
                "hourly count failed"
            );
            RepositoryError::from(e)
        })?;

        Ok(count.max(0) as u32)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sent_news_items WHERE sent_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(operation = "sent_news.purge_older_than", error = %e, "purge failed");
                RepositoryError::from(e)
            })?;

        Ok(result.rows_affected())
    }
}

/// Test fixture shared with the in-memory implementation tests.
#[cfg(test)]
pub(crate) fn sample_sent_item(
    external_id: &str,
    channel_id: &str,
    sent_at: DateTime<Utc>,
) -> SentNewsItem {
    use brobot_core::news::{NewsCategory, NewsItem};

    SentNewsItem {
        item: NewsItem {
            external_id: external_id.to_owned(),
            title: "Un titre".to_owned(),
            description: "Une description suffisamment longue pour le test".to_owned(),
            url: "https://example.fr/article".to_owned(),
            published_at: sent_at,
            source: "RSS Feed".to_owned(),
            category: NewsCategory::Sports,
            image_url: None,
            author: None,
        },
        channel_id: channel_id.to_owned(),
        message_id: "message-1".to_owned(),
        thread_id: None,
        sent_at,
    }
}
