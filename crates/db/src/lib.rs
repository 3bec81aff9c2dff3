pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryNewsConfigRepository, InMemoryReviewRepository, InMemorySentNewsRepository,
    InMemoryUserRepository, NewsConfigRepository, RepositoryError, ReviewRepository,
    SentNewsRepository, SqlNewsConfigRepository, SqlReviewRepository, SqlSentNewsRepository,
    SqlUserRepository, UserRepository,
};
