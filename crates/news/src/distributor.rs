use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, warn};

use brobot_core::news::{ChannelConfig, NewsCategory, NewsItem, SentNewsItem};
use brobot_db::repositories::{NewsConfigRepository, RepositoryError, SentNewsRepository};
use brobot_discord::api::DiscordApi;
use brobot_discord::embeds::{Embed, OutboundMessage};

use crate::provider::NewsProvider;

const PER_CATEGORY_QUOTA: u32 = 1;
const CAP_WINDOW_MINUTES: i64 = 60;
const RETENTION_DAYS: i64 = 7;
const SEND_PACING: Duration = Duration::from_secs(2);
const THREAD_AUTO_ARCHIVE_MINUTES: u16 = 1440;
const THREAD_TITLE_CHARS: usize = 80;
const EMBED_DESCRIPTION_CHARS: usize = 300;
const DRY_RUN_MESSAGE_ID: &str = "dry-run-message-id";
const DRY_RUN_THREAD_ID: &str = "dry-run-thread-id";

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", truncate_chars(text, max_chars))
    } else {
        text.to_owned()
    }
}

fn thread_name(title: &str) -> String {
    format!("💬 {}", truncate_chars(title, THREAD_TITLE_CHARS))
}

/// The message card posted for one story.
pub fn news_embed(story: &NewsItem) -> Embed {
    let mut embed = Embed::new()
        .title(story.title.as_str())
        .url(story.url.as_str())
        .color(story.category.color())
        .timestamp(story.published_at.to_rfc3339());
    if !story.description.is_empty() {
        embed = embed.description(ellipsize(&story.description, EMBED_DESCRIPTION_CHARS));
    }
    if let Some(ref image_url) = story.image_url {
        embed = embed.image(image_url.as_str());
    }
    if let Some(ref author) = story.author {
        embed = embed.author(author.as_str());
    }
    embed.footer(format!("📰 {}", story.source))
}

/// Fans fresh stories out to every enabled channel configuration, capped
/// per channel per trailing hour and deduplicated per (story, channel).
pub struct Distributor {
    api: Arc<dyn DiscordApi>,
    provider: Arc<dyn NewsProvider>,
    configs: Arc<dyn NewsConfigRepository>,
    sent: Arc<dyn SentNewsRepository>,
    dry_run: bool,
    pacing: Duration,
}

impl Distributor {
    pub fn new(
        api: Arc<dyn DiscordApi>,
        provider: Arc<dyn NewsProvider>,
        configs: Arc<dyn NewsConfigRepository>,
        sent: Arc<dyn SentNewsRepository>,
        dry_run: bool,
    ) -> Self {
        Self { api, provider, configs, sent, dry_run, pacing: SEND_PACING }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// One distribution pass. Failures are contained per channel; a broken
    /// configuration never blocks the others.
    pub async fn tick(&self) {
        let configs = match self.configs.list_enabled().await {
            Ok(configs) => configs,
            Err(repo_error) => {
                error!(error = %repo_error, "failed to list enabled news configs");
                return;
            }
        };

        for config in configs {
            if let Err(repo_error) = self.process_config(&config).await {
                error!(
                    channel_id = %config.channel_id,
                    error = %repo_error,
                    "news distribution failed for channel"
                );
            }
        }

        let retention_cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);
        match self.sent.purge_older_than(retention_cutoff).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged aged delivery records"),
            Err(repo_error) => warn!(error = %repo_error, "delivery record purge failed"),
        }
    }

    async fn process_config(&self, config: &ChannelConfig) -> Result<(), RepositoryError> {
        let window_start = Utc::now() - ChronoDuration::minutes(CAP_WINDOW_MINUTES);
        let sent_last_hour = self.sent.count_sent_since(&config.channel_id, window_start).await?;
        let cap = u32::from(config.max_per_hour);
        if sent_last_hour >= cap {
            debug!(
                channel_id = %config.channel_id,
                sent_last_hour,
                cap,
                "hourly cap reached, skipping channel"
            );
            return Ok(());
        }

        let mut allowance = cap - sent_last_hour;
        for category in &config.categories {
            if allowance == 0 {
                break;
            }
            let quota = PER_CATEGORY_QUOTA.min(allowance);
            let delivered = self.process_category(*category, config, quota).await?;
            allowance -= delivered.min(allowance);
        }
        Ok(())
    }

    async fn process_category(
        &self,
        category: NewsCategory,
        config: &ChannelConfig,
        quota: u32,
    ) -> Result<u32, RepositoryError> {
        // Overfetch so that already-delivered stories still leave candidates.
        let stories = self.provider.fetch(category, quota as usize * 2).await;
        if stories.is_empty() {
            debug!(
                provider = self.provider.name(),
                category = category.as_str(),
                "no stories available"
            );
            return Ok(0);
        }

        let external_ids: Vec<String> =
            stories.iter().map(|story| story.external_id.clone()).collect();
        let already = self.sent.already_sent_ids(&external_ids, &config.channel_id).await?;
        let fresh: Vec<NewsItem> = stories
            .into_iter()
            .filter(|story| !already.contains(&story.external_id))
            .take(quota as usize)
            .collect();

        let mut delivered = 0_u32;
        for story in fresh {
            if delivered > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            if self.deliver(story, config).await? {
                delivered += 1;
            }
        }

        if delivered > 0 {
            info!(
                event_name = "news.delivered",
                category = category.as_str(),
                channel_id = %config.channel_id,
                count = delivered,
                "sent stories to channel"
            );
        }
        Ok(delivered)
    }

    /// Posts one story, returns whether it was delivered. Thread and
    /// reaction failures are absorbed; the story still counts.
    async fn deliver(
        &self,
        story: NewsItem,
        config: &ChannelConfig,
    ) -> Result<bool, RepositoryError> {
        if self.dry_run {
            info!(
                event_name = "news.dry_run",
                channel_id = %config.channel_id,
                title = %story.title,
                source = %story.source,
                category = story.category.as_str(),
                would_create_thread = config.create_threads,
                would_add_reactions = config.add_reactions,
                "🧪 would send story"
            );
            self.sent
                .record(SentNewsItem {
                    item: story,
                    channel_id: config.channel_id.clone(),
                    message_id: DRY_RUN_MESSAGE_ID.to_owned(),
                    thread_id: config.create_threads.then(|| DRY_RUN_THREAD_ID.to_owned()),
                    sent_at: Utc::now(),
                })
                .await?;
            return Ok(true);
        }

        let message = OutboundMessage::embed(news_embed(&story))
            .content(format!("{} **Nouveauté**", story.category.label()));
        let message_id = match self.api.create_message(&config.channel_id, &message).await {
            Ok(message_id) => message_id,
            Err(api_error) => {
                error!(
                    external_id = %story.external_id,
                    channel_id = %config.channel_id,
                    error = %api_error,
                    "failed to post story"
                );
                return Ok(false);
            }
        };

        let mut thread_id = None;
        if config.create_threads {
            match self
                .api
                .start_thread(
                    &config.channel_id,
                    &message_id,
                    &thread_name(&story.title),
                    THREAD_AUTO_ARCHIVE_MINUTES,
                )
                .await
            {
                Ok(id) => thread_id = Some(id),
                Err(api_error) => {
                    warn!(message_id = %message_id, error = %api_error, "failed to create thread");
                }
            }
        }

        if config.add_reactions {
            for emoji in ["👍", "👎"] {
                if let Err(api_error) =
                    self.api.create_reaction(&config.channel_id, &message_id, emoji).await
                {
                    warn!(message_id = %message_id, error = %api_error, "failed to add reaction");
                }
            }
        }

        self.sent
            .record(SentNewsItem {
                item: story,
                channel_id: config.channel_id.clone(),
                message_id,
                thread_id,
                sent_at: Utc::now(),
            })
            .await?;
        Ok(true)
    }
}
