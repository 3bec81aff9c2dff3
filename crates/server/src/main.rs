mod bootstrap;
mod http;
mod keepalive;
mod services;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use brobot_core::config::{AppConfig, Environment, LoadOptions};
use brobot_discord::commands::{command_specs, validate_specs, CommandService};
use brobot_discord::gateway::{GatewayRunner, NoopGatewayTransport, ReconnectPolicy};
use brobot_discord::handlers::InteractionHandler;

fn init_logging(config: &AppConfig) {
    use brobot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Panics are the only process-fatal path. In production the process
/// exits non-zero after a short grace period so the log line can flush;
/// in development it stays up for inspection.
fn install_fatal_handler(environment: Environment) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(event_name = "server.fatal", %panic_info, "unhandled process error");
        default_hook(panic_info);
        if environment.is_production() {
            std::thread::spawn(|| {
                std::thread::sleep(Duration::from_secs(5));
                std::process::exit(1);
            });
        }
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    install_fatal_handler(config.environment);

    let app = bootstrap::bootstrap_with_config(config).await?;

    // Command metadata goes out before the gateway connects so the first
    // interaction already matches what we can parse.
    let specs = command_specs();
    validate_specs(&specs)?;
    app.api.register_commands(&app.config.discord.application_id, &specs).await?;
    tracing::info!(
        event_name = "server.commands_registered",
        count = specs.len(),
        "slash commands registered"
    );

    http::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        http::HttpState {
            db_pool: app.db_pool.clone(),
            status: app.status.clone(),
            keep_alive: app.keep_alive.clone(),
            service: app.service.clone(),
            environment: app.config.environment,
            authorized_users: app.config.discord.authorized_users.len(),
            started_at: Instant::now(),
        },
    )
    .await?;

    let keep_alive_task = app.keep_alive.clone().spawn();

    let news_task = {
        let distributor = app.distributor.clone();
        let period = Duration::from_secs(app.config.news.check_interval_secs);
        tokio::spawn(async move {
            // First pass one full period in; startup stays quiet.
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                distributor.tick().await;
            }
        })
    };
    tracing::info!(
        event_name = "server.news_timer_started",
        interval_secs = app.config.news.check_interval_secs,
        dry_run = app.config.news.dry_run,
        "news distribution timer started"
    );

    let handler = Arc::new(InteractionHandler::new(
        app.service.clone() as Arc<dyn CommandService>,
        app.api.clone(),
    ));
    let gateway = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        handler,
        app.status.clone(),
        ReconnectPolicy::default(),
    );
    gateway.start().await?;

    tracing::info!(
        event_name = "server.started",
        environment = app.config.environment.as_str(),
        "brobot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(event_name = "server.stopping", "brobot-server stopping");

    news_task.abort();
    if let Some(task) = keep_alive_task {
        task.abort();
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    // SIGTERM is what container hosts send; ctrl_c covers local runs.
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
