use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use brobot_core::news::{ChannelConfig, ChannelConfigUpdate, NewChannelConfig, SentNewsItem};
use brobot_core::review::{NewReview, Review, User};

pub mod memory;
pub mod news_config;
pub mod review;
pub mod sent_news;
pub mod user;

pub use memory::{
    InMemoryNewsConfigRepository, InMemoryReviewRepository, InMemorySentNewsRepository,
    InMemoryUserRepository,
};
pub use news_config::SqlNewsConfigRepository;
pub use review::SqlReviewRepository;
pub use sent_news::SqlSentNewsRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("a news configuration already exists for channel {channel_id}")]
    ConfigAlreadyExists { channel_id: String },
    #[error("no news configuration exists for channel {channel_id}")]
    ConfigNotFound { channel_id: String },
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Idempotent upsert keyed by Discord ID; refreshes the username.
    async fn find_or_create(&self, discord_id: &str, username: &str)
        -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, user_id: i64, review: NewReview) -> Result<Review, RepositoryError>;

    /// Most recent first, capped to `limit`.
    async fn list_for_user(&self, user_id: i64, limit: u32)
        -> Result<Vec<Review>, RepositoryError>;
}

#[async_trait]
pub trait NewsConfigRepository: Send + Sync {
    /// Fails with [`RepositoryError::ConfigAlreadyExists`] when the channel
    /// already has a configuration; no row is written in that case.
    async fn create(&self, config: NewChannelConfig) -> Result<ChannelConfig, RepositoryError>;

    async fn get(&self, channel_id: &str) -> Result<Option<ChannelConfig>, RepositoryError>;

    async fn update(
        &self,
        channel_id: &str,
        update: ChannelConfigUpdate,
    ) -> Result<ChannelConfig, RepositoryError>;

    async fn delete(&self, channel_id: &str) -> Result<(), RepositoryError>;

    async fn list_enabled(&self) -> Result<Vec<ChannelConfig>, RepositoryError>;
}

#[async_trait]
pub trait SentNewsRepository: Send + Sync {
    async fn record(&self, item: SentNewsItem) -> Result<(), RepositoryError>;

    /// Which of `external_ids` were already recorded for `channel_id`.
    async fn already_sent_ids(
        &self,
        external_ids: &[String],
        channel_id: &str,
    ) -> Result<Vec<String>, RepositoryError>;

    /// Deliveries to `channel_id` with `sent_at` after `cutoff`.
    async fn count_sent_since(
        &self,
        channel_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Removes delivery records older than `cutoff`; returns rows deleted.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
