//! Read-only status surface. Unauthenticated by design; nothing here can
//! mutate bot state beyond forcing a keep-alive attempt.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use brobot_core::config::Environment;
use brobot_db::DbPool;
use brobot_discord::gateway::BotStatus;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::keepalive::{KeepAliveService, KeepAliveStats, PingOutcome};
use crate::services::BotCommandService;

#[derive(Clone)]
pub struct HttpState {
    pub db_pool: DbPool,
    pub status: Arc<BotStatus>,
    pub keep_alive: Arc<KeepAliveService>,
    pub service: Arc<BotCommandService>,
    pub environment: Environment,
    pub authorized_users: usize,
    pub started_at: Instant,
}

impl HttpState {
    fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub bot: &'static str,
    pub environment: &'static str,
    pub uptime_secs: u64,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub rss_bytes: u64,
    pub vsize_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub discord: &'static str,
    pub database: &'static str,
    pub keep_alive: KeepAliveStats,
    pub environment: &'static str,
    pub memory: Option<MemoryUsage>,
    pub uptime_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsResponse {
    pub guilds: u64,
    pub users: u64,
    pub ping_ms: u64,
    pub commands: u64,
    pub authorized_users: usize,
    pub uptime_secs: u64,
    pub keep_alive: KeepAliveStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PingResponse {
    pub forced: bool,
    pub outcome: Option<PingOutcome>,
    pub error: Option<String>,
    pub keep_alive: KeepAliveStats,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ping", get(ping))
        .with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HttpState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(event_name = "http.start", bind_address = %address, "status server started");

    tokio::spawn(async move {
        if let Err(http_error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "http.error",
                error = %http_error,
                "status server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn root(State(state): State<HttpState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "online",
        bot: "BroBot",
        environment: state.environment.as_str(),
        uptime_secs: state.uptime_secs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn health(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = database_check(&state.db_pool).await;

    let payload = HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" },
        discord: if state.status.is_ready() { "connected" } else { "disconnected" },
        database: if database_ok { "connected" } else { "disconnected" },
        keep_alive: state.keep_alive.stats(),
        environment: state.environment.as_str(),
        memory: memory_usage(),
        uptime_secs: state.uptime_secs(),
    };

    let code = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(payload))
}

pub async fn stats(
    State(state): State<HttpState>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !state.status.is_ready() {
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: "Bot not ready" })));
    }

    let snapshot = state.status.snapshot();
    Ok(Json(StatsResponse {
        guilds: snapshot.guild_count,
        users: snapshot.user_count,
        ping_ms: snapshot.ping_ms,
        commands: state.service.commands_handled(),
        authorized_users: state.authorized_users,
        uptime_secs: state.uptime_secs(),
        keep_alive: state.keep_alive.stats(),
    }))
}

pub async fn ping(State(state): State<HttpState>) -> Json<PingResponse> {
    let attempt = state.keep_alive.ping_once().await;
    let (forced, outcome, outcome_error) = match attempt {
        None => (false, None, None),
        Some(Ok(outcome)) => (true, Some(outcome), None),
        Some(Err(ping_error)) => (true, None, Some(ping_error.to_string())),
    };

    Json(PingResponse {
        forced,
        outcome,
        error: outcome_error,
        keep_alive: state.keep_alive.stats(),
    })
}

async fn database_check(pool: &DbPool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.is_ok()
}

#[cfg(target_os = "linux")]
fn memory_usage() -> Option<MemoryUsage> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = statm.split_whitespace();
    let vsize_pages: u64 = fields.next()?.parse().ok()?;
    let rss_pages: u64 = fields.next()?.parse().ok()?;
    let page_size = 4096;
    Some(MemoryUsage { rss_bytes: rss_pages * page_size, vsize_bytes: vsize_pages * page_size })
}

#[cfg(not(target_os = "linux"))]
fn memory_usage() -> Option<MemoryUsage> {
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use brobot_core::config::Environment;
    use brobot_db::{
        connect_with_settings, InMemoryNewsConfigRepository, InMemoryReviewRepository,
        InMemoryUserRepository,
    };
    use brobot_discord::gateway::BotStatus;

    use crate::keepalive::{KeepAliveService, PingError, PingOutcome, Pinger};
    use crate::services::BotCommandService;

    use super::{health, ping, root, stats, HttpState};

    struct AlwaysUpPinger;

    #[async_trait]
    impl Pinger for AlwaysUpPinger {
        async fn ping(
            &self,
            _url: &str,
            _timeout: Duration,
            _user_agent: &str,
        ) -> Result<PingOutcome, PingError> {
            Ok(PingOutcome { status: 200, duration_ms: 3 })
        }
    }

    async fn state(keep_alive_url: Option<String>) -> HttpState {
        let db_pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        let service = BotCommandService::new(
            Arc::new(InMemoryUserRepository::default()),
            Arc::new(InMemoryReviewRepository::default()),
            Arc::new(InMemoryNewsConfigRepository::default()),
            vec!["42".to_string()],
        );
        HttpState {
            db_pool,
            status: Arc::new(BotStatus::default()),
            keep_alive: Arc::new(KeepAliveService::new(Arc::new(AlwaysUpPinger), keep_alive_url)),
            service: Arc::new(service),
            environment: Environment::Development,
            authorized_users: 1,
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn root_reports_the_bot_online() {
        let state = state(None).await;
        let Json(payload) = root(State(state.clone())).await;

        assert_eq!(payload.status, "online");
        assert_eq!(payload.bot, "BroBot");
        assert_eq!(payload.environment, "development");

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_the_database_is_unreachable() {
        let state = state(None).await;

        let (code, Json(payload)) = health(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(payload.status, "healthy");
        assert_eq!(payload.database, "connected");
        assert_eq!(payload.discord, "disconnected");

        state.db_pool.close().await;
        let (code, Json(payload)) = health(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database, "disconnected");
    }

    #[tokio::test]
    async fn stats_stay_unavailable_until_the_gateway_is_ready() {
        let state = state(None).await;

        let refused = stats(State(state.clone())).await;
        let (code, Json(payload)) = refused.expect_err("not ready yet");
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.error, "Bot not ready");

        state.status.mark_ready(3, 150);
        state.status.set_ping(42);
        let Json(payload) = stats(State(state.clone())).await.expect("ready now");
        assert_eq!(payload.guilds, 3);
        assert_eq!(payload.users, 150);
        assert_eq!(payload.ping_ms, 42);
        assert_eq!(payload.authorized_users, 1);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn ping_forces_a_keep_alive_attempt() {
        let state = state(Some("https://bot.example/".to_owned())).await;

        let Json(payload) = ping(State(state.clone())).await;
        assert!(payload.forced);
        assert_eq!(payload.outcome.as_ref().map(|o| o.status), Some(200));
        assert_eq!(payload.keep_alive.total_pings, 1);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn ping_reports_an_inactive_service() {
        let state = state(None).await;

        let Json(payload) = ping(State(state.clone())).await;
        assert!(!payload.forced);
        assert!(!payload.keep_alive.active);

        state.db_pool.close().await;
    }
}
