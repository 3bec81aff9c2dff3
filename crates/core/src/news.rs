use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six deliverable news categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsCategory {
    Sports,
    Gaming,
    Films,
    Series,
    Wwe,
    Lectures,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 6] =
        [Self::Sports, Self::Gaming, Self::Films, Self::Series, Self::Wwe, Self::Lectures];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sports => "sports",
            Self::Gaming => "gaming",
            Self::Films => "films",
            Self::Series => "series",
            Self::Wwe => "wwe",
            Self::Lectures => "lectures",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == value.trim())
    }

    /// Emoji-prefixed French display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sports => "⚽ Sports",
            Self::Gaming => "🎮 Gaming",
            Self::Films => "🎬 Films",
            Self::Series => "📺 Séries",
            Self::Wwe => "🤼 WWE",
            Self::Lectures => "📚 Lectures",
        }
    }

    /// Embed accent color.
    pub fn color(self) -> u32 {
        match self {
            Self::Sports => 0x00FF00,
            Self::Gaming => 0x9966CC,
            Self::Films => 0xFF6B6B,
            Self::Series => 0x4ECDC4,
            Self::Wwe => 0xFFD93D,
            Self::Lectures => 0x6C5CE7,
        }
    }
}

/// A fetched news story, not yet tied to any destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewsItem {
    /// Provider-assigned stable ID, used with the channel ID as dedup key.
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub category: NewsCategory,
    pub image_url: Option<String>,
    pub author: Option<String>,
}

/// Per-channel delivery settings. At most one per channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub id: i64,
    pub channel_id: String,
    pub categories: Vec<NewsCategory>,
    pub create_threads: bool,
    pub add_reactions: bool,
    pub max_per_hour: u8,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a channel configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChannelConfig {
    pub channel_id: String,
    pub categories: Vec<NewsCategory>,
    pub create_threads: bool,
    pub add_reactions: bool,
    pub max_per_hour: u8,
    pub enabled: bool,
}

impl Default for NewChannelConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            categories: Vec::new(),
            create_threads: false,
            add_reactions: true,
            max_per_hour: 3,
            enabled: true,
        }
    }
}

/// Partial update applied to an existing channel configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelConfigUpdate {
    pub categories: Option<Vec<NewsCategory>>,
    pub create_threads: Option<bool>,
    pub add_reactions: Option<bool>,
    pub max_per_hour: Option<u8>,
    pub enabled: Option<bool>,
}

impl ChannelConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.categories.is_none()
            && self.create_threads.is_none()
            && self.add_reactions.is_none()
            && self.max_per_hour.is_none()
            && self.enabled.is_none()
    }
}

/// Delivery record written once per (story, channel) after a send or dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentNewsItem {
    pub item: NewsItem,
    pub channel_id: String,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Parses a comma-separated category list, keeping only known values.
pub fn parse_category_list(input: &str) -> Vec<NewsCategory> {
    let mut categories: Vec<NewsCategory> =
        input.split(',').filter_map(NewsCategory::parse).collect();
    categories.dedup();
    categories
}
