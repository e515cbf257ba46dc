mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::{Context, Result};
use cartwise_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use crate::api::ApiState;
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use cartwise_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let api_state = ApiState {
        chat_router: app.chat_router.clone(),
        prediction_cache: app.prediction_cache.clone(),
        display_limit: app.config.assistant.display_limit,
        forecast_weighting: app.config.assistant.forecast_weighting,
    };
    let health_state = HealthState { chat_router: app.chat_router.clone(), db_pool: app.db_pool.clone() };

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind `{address}`"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        ai_enabled = app.chat_router.ai_enabled(),
        "cartwise-server listening"
    );

    axum::serve(listener, api::router(api_state, health_state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "cartwise-server stopping"
    );
    if let Some(pool) = app.db_pool {
        if tokio::time::timeout(shutdown_grace, pool.close()).await.is_err() {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                "cache database did not close within the grace period"
            );
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
