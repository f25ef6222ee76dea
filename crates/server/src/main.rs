mod api;
mod bootstrap;
mod diagnostics;
mod gateway;
mod health;
#[cfg(test)]
mod testing;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use linedesk_core::config::{load_dotenv, AppConfig, LoadOptions, DOTENV_FILE};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::gateway::{spawn_event_worker, EventProcessor, EVENT_QUEUE_CAPACITY};

fn init_logging(config: &AppConfig) {
    use linedesk_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

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

pub async fn run() -> Result<()> {
    let dotenv_loaded = load_dotenv(Path::new(DOTENV_FILE))?;
    // Logging comes up before bootstrap so its events are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    if dotenv_loaded {
        tracing::debug!(
            event_name = "system.config.dotenv_loaded",
            correlation_id = "bootstrap",
            path = DOTENV_FILE,
            "loaded .env"
        );
    }

    let app = bootstrap::bootstrap_with_config(config).await?;
    let processor =
        EventProcessor::new(app.agents.clone(), app.conversations.clone(), app.messaging.clone());
    let (events, worker) = spawn_event_worker(processor, EVENT_QUEUE_CAPACITY);

    let state = AppState {
        agents: app.agents.clone(),
        conversations: app.conversations.clone(),
        messaging: app.messaging.clone(),
        verifier: app.verifier.clone(),
        events,
    };

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "linedesk-server listening"
    );

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("http server terminated unexpectedly")?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "draining event worker"
    );
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, worker).await {
        Ok(Ok(summary)) => tracing::info!(
            event_name = "system.server.stopped",
            correlation_id = "shutdown",
            handled = summary.handled,
            failed = summary.failed,
            "linedesk-server stopped"
        ),
        Ok(Err(join_error)) => tracing::error!(
            event_name = "system.server.worker_failed",
            correlation_id = "shutdown",
            error = %join_error,
            "event worker did not shut down cleanly"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            grace_secs = app.config.server.graceful_shutdown_secs,
            "event worker still busy after grace period"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
