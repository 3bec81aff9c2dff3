use std::sync::Arc;

use brobot_core::config::{AppConfig, ConfigError, LoadOptions};
use brobot_db::{
    connect, migrations, DbPool, SqlNewsConfigRepository, SqlReviewRepository,
    SqlSentNewsRepository, SqlUserRepository,
};
use brobot_discord::api::{ApiError, DiscordApi, HttpDiscordApi};
use brobot_discord::gateway::BotStatus;
use brobot_news::{Distributor, HttpFeedFetcher, RssProvider};
use thiserror::Error;
use tracing::info;

use crate::keepalive::{HttpPinger, KeepAliveService, PingError};
use crate::services::BotCommandService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: Arc<dyn DiscordApi>,
    pub service: Arc<BotCommandService>,
    pub status: Arc<BotStatus>,
    pub keep_alive: Arc<KeepAliveService>,
    pub distributor: Arc<Distributor>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("discord client construction failed: {0}")]
    DiscordClient(#[source] ApiError),
    #[error("news provider construction failed: {0}")]
    NewsProvider(String),
    #[error("keep-alive client construction failed: {0}")]
    KeepAlive(#[source] PingError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the full object graph from an already-loaded config. Fail-fast:
/// any construction error aborts startup before the gateway connects.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "bootstrap.migrations_applied", "database migrations applied");

    let api: Arc<dyn DiscordApi> = Arc::new(
        HttpDiscordApi::new(config.discord.bot_token.clone())
            .map_err(BootstrapError::DiscordClient)?,
    );

    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let reviews = Arc::new(SqlReviewRepository::new(db_pool.clone()));
    let news_configs = Arc::new(SqlNewsConfigRepository::new(db_pool.clone()));
    let sent_news = Arc::new(SqlSentNewsRepository::new(db_pool.clone()));

    let service = Arc::new(BotCommandService::new(
        users,
        reviews,
        news_configs.clone(),
        config.discord.authorized_users.clone(),
    ));

    let fetcher =
        HttpFeedFetcher::new().map_err(|fetch_error| BootstrapError::NewsProvider(fetch_error.to_string()))?;
    let provider = RssProvider::new(Arc::new(fetcher))
        .map_err(|regex_error| BootstrapError::NewsProvider(regex_error.to_string()))?;
    let distributor = Arc::new(Distributor::new(
        api.clone(),
        Arc::new(provider),
        news_configs,
        sent_news,
        config.news.dry_run,
    ));

    let keep_alive = Arc::new(KeepAliveService::new(
        Arc::new(HttpPinger::new().map_err(BootstrapError::KeepAlive)?),
        config.keep_alive.url.clone(),
    ));

    Ok(Application {
        config,
        db_pool,
        api,
        service,
        status: Arc::new(BotStatus::default()),
        keep_alive,
        distributor,
    })
}
