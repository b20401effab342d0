mod bootstrap;
mod health;
mod messages;

use anyhow::Result;
use axum::Router;
use leavedesk_core::config::{AppConfig, LoadOptions};
use tracing::{error, info};

fn init_logging(config: &AppConfig) {
    use leavedesk_core::config::LogFormat::*;
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

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be live before bootstrap so its events are not lost.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router: Router =
        health::router(app.db_pool.clone()).merge(messages::router(app.messages_state()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "leavedesk-server listening"
    );

    if let Err(serve_error) =
        axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await
    {
        error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %serve_error,
            "server terminated unexpectedly"
        );
    }

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "leavedesk-server stopping"
    );
    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %signal_error,
            "could not listen for shutdown signal"
        );
    }
}
