use async_trait::async_trait;

use brobot_core::news::{NewsCategory, NewsItem};

/// A source of fresh stories for one category. Implementations absorb
/// their own failures; a broken upstream yields an empty batch.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch(&self, category: NewsCategory, limit: usize) -> Vec<NewsItem>;

    fn name(&self) -> &'static str;
}
