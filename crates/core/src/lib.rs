pub mod config;
pub mod errors;
pub mod news;
pub mod review;

pub use config::{AppConfig, ConfigError, ConfigOverrides, Environment, LoadOptions};
pub use errors::BotError;
pub use news::{
    ChannelConfig, ChannelConfigUpdate, NewChannelConfig, NewsCategory, NewsItem, SentNewsItem,
};
pub use review::{
    format_rating, format_work_type, is_authorized, validate_authorization, validate_comment,
    validate_rating, validate_rating_strict, validate_title, validate_work_type,
    validate_work_type_strict, NewReview, Review, User, WorkType,
};
