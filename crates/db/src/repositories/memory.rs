use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use brobot_core::news::{ChannelConfig, ChannelConfigUpdate, NewChannelConfig, SentNewsItem};
use brobot_core::review::{NewReview, Review, User};

use super::{
    NewsConfigRepository, RepositoryError, ReviewRepository, SentNewsRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_or_create(
        &self,
        discord_id: &str,
        username: &str,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(discord_id) {
            user.username = username.to_owned();
            return Ok(user.clone());
        }

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            discord_id: discord_id.to_owned(),
            username: username.to_owned(),
            created_at: Utc::now(),
        };
        users.insert(discord_id.to_owned(), user.clone());
        Ok(user)
    }
}

#[derive(Default)]
pub struct InMemoryReviewRepository {
    reviews: RwLock<Vec<Review>>,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl ReviewRepository for InMemoryReviewRepository {
    async fn create(&self, user_id: i64, review: NewReview) -> Result<Review, RepositoryError> {
        let review = Review {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            title: review.title,
            work_type: review.work_type,
            rating: review.rating,
            comment: review.comment,
            created_at: Utc::now(),
        };
        self.reviews.write().await.push(review.clone());
        Ok(review)
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Review>, RepositoryError> {
        let reviews = self.reviews.read().await;
        let mut matching: Vec<Review> =
            reviews.iter().filter(|r| r.user_id == user_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryNewsConfigRepository {
    configs: RwLock<HashMap<String, ChannelConfig>>,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl NewsConfigRepository for InMemoryNewsConfigRepository {
    async fn create(&self, config: NewChannelConfig) -> Result<ChannelConfig, RepositoryError> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.channel_id) {
            return Err(RepositoryError::ConfigAlreadyExists { channel_id: config.channel_id });
        }

        let now = Utc::now();
        let stored = ChannelConfig {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            channel_id: config.channel_id.clone(),
            categories: config.categories,
            create_threads: config.create_threads,
            add_reactions: config.add_reactions,
            max_per_hour: config.max_per_hour,
            enabled: config.enabled,
            created_at: now,
            updated_at: now,
        };
        configs.insert(config.channel_id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, channel_id: &str) -> Result<Option<ChannelConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(channel_id).cloned())
    }

    async fn update(
        &self,
        channel_id: &str,
        update: ChannelConfigUpdate,
    ) -> Result<ChannelConfig, RepositoryError> {
        let mut configs = self.configs.write().await;
        let config = configs.get_mut(channel_id).ok_or_else(|| {
            RepositoryError::ConfigNotFound { channel_id: channel_id.to_owned() }
        })?;

        if let Some(categories) = update.categories {
            config.categories = categories;
        }
        if let Some(create_threads) = update.create_threads {
            config.create_threads = create_threads;
        }
        if let Some(add_reactions) = update.add_reactions {
            config.add_reactions = add_reactions;
        }
        if let Some(max_per_hour) = update.max_per_hour {
            config.max_per_hour = max_per_hour;
        }
        if let Some(enabled) = update.enabled {
            config.enabled = enabled;
        }
        config.updated_at = Utc::now();
        Ok(config.clone())
    }

    async fn delete(&self, channel_id: &str) -> Result<(), RepositoryError> {
        self.configs.write().await.remove(channel_id);
        Ok(())
    }

    async fn list_enabled(&self) -> Result<Vec<ChannelConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        let mut enabled: Vec<ChannelConfig> =
            configs.values().filter(|c| c.enabled).cloned().collect();
        enabled.sort_by_key(|c| c.id);
        Ok(enabled)
    }
}

#[derive(Default)]
pub struct InMemorySentNewsRepository {
    sent: RwLock<Vec<SentNewsItem>>,
}

#[async_trait::async_trait]
impl SentNewsRepository for InMemorySentNewsRepository {
    async fn record(&self, item: SentNewsItem) -> Result<(), RepositoryError> {
        self.sent.write().await.push(item);
        Ok(())
    }

    async fn already_sent_ids(
        &self,
        external_ids: &[String],
        channel_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        let sent = self.sent.read().await;
        Ok(external_ids
            .iter()
            .filter(|id| {
                sent.iter().any(|s| s.channel_id == channel_id && s.item.external_id == **id)
            })
            .cloned()
            .collect())
    }

    async fn count_sent_since(
        &self,
        channel_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let sent = self.sent.read().await;
        Ok(sent.iter().filter(|s| s.channel_id == channel_id && s.sent_at > cutoff).count() as u32)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sent = self.sent.write().await;
        let before = sent.len();
        sent.retain(|s| s.sent_at >= cutoff);
        Ok((before - sent.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use brobot_core::news::{ChannelConfigUpdate, NewChannelConfig, NewsCategory};
    use brobot_core::review::{NewReview, WorkType};

    use super::{
        InMemoryNewsConfigRepository, InMemoryReviewRepository, InMemorySentNewsRepository,
        InMemoryUserRepository,
    };
    use crate::repositories::sent_news::sample_sent_item;
    use crate::repositories::{
        NewsConfigRepository, RepositoryError, ReviewRepository, SentNewsRepository,
        UserRepository,
    };

    #[tokio::test]
    async fn find_or_create_reuses_the_same_user() {
        let repo = InMemoryUserRepository::default();

        let first = repo.find_or_create("42", "brice").await.expect("create");
        let second = repo.find_or_create("42", "brice-renamed").await.expect("find");

        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "brice-renamed");
    }

    #[tokio::test]
    async fn reviews_list_newest_first_for_the_requested_user() {
        let repo = InMemoryReviewRepository::default();
        for i in 0..3 {
            repo.create(
                1,
                NewReview {
                    title: format!("titre-{i}"),
                    work_type: WorkType::Film,
                    rating: 4,
                    comment: "bon film".to_owned(),
                },
            )
            .await
            .expect("create");
        }
        repo.create(
            2,
            NewReview {
                title: "autre".to_owned(),
                work_type: WorkType::Manga,
                rating: 5,
                comment: "excellent".to_owned(),
            },
        )
        .await
        .expect("create");

        let listed = repo.list_for_user(1, 2).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "titre-2");
        assert_eq!(listed[1].title, "titre-1");
    }

    #[tokio::test]
    async fn duplicate_config_is_rejected() {
        let repo = InMemoryNewsConfigRepository::default();
        let config = NewChannelConfig {
            channel_id: "chan-a".to_owned(),
            categories: vec![NewsCategory::Sports],
            ..NewChannelConfig::default()
        };

        repo.create(config.clone()).await.expect("create");
        let err = repo.create(config).await.expect_err("duplicate");
        assert!(matches!(err, RepositoryError::ConfigAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields_alone() {
        let repo = InMemoryNewsConfigRepository::default();
        repo.create(NewChannelConfig {
            channel_id: "chan-a".to_owned(),
            categories: vec![NewsCategory::Gaming],
            ..NewChannelConfig::default()
        })
        .await
        .expect("create");

        let updated = repo
            .update(
                "chan-a",
                ChannelConfigUpdate { max_per_hour: Some(7), ..ChannelConfigUpdate::default() },
            )
            .await
            .expect("update");

        assert_eq!(updated.max_per_hour, 7);
        assert_eq!(updated.categories, vec![NewsCategory::Gaming]);
        assert!(updated.add_reactions);
    }

    #[tokio::test]
    async fn sent_news_dedup_and_window_match_the_sql_behaviour() {
        let repo = InMemorySentNewsRepository::default();
        let now = Utc::now();

        repo.record(sample_sent_item("story-1", "chan-a", now - Duration::minutes(90)))
            .await
            .expect("record");
        repo.record(sample_sent_item("story-2", "chan-a", now)).await.expect("record");

        let ids = vec!["story-1".to_owned(), "story-2".to_owned()];
        assert_eq!(repo.already_sent_ids(&ids, "chan-a").await.expect("lookup"), ids);
        assert!(repo.already_sent_ids(&ids, "chan-b").await.expect("lookup").is_empty());

        let count = repo
            .count_sent_since("chan-a", now - Duration::minutes(60))
            .await
            .expect("count");
        assert_eq!(count, 1);

        let purged = repo.purge_older_than(now - Duration::minutes(60)).await.expect("purge");
        assert_eq!(purged, 1);
    }
}
