use std::sync::Arc;

use leavedesk_agent::{assemble, Collaborators, GatewayError, Orchestrator};
use leavedesk_core::config::{AppConfig, ConfigError};
use leavedesk_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::messages::MessagesState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub collaborators: Collaborators,
}

impl Application {
    pub fn messages_state(&self) -> MessagesState {
        MessagesState {
            orchestrator: self.orchestrator.clone(),
            users: self.collaborators.users.clone(),
            conversations: self.collaborators.conversations.clone(),
            context_turns: self.config.routing.context_turns,
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let collaborators = Collaborators::from_config(&config, db_pool.clone())?;
    let orchestrator = Arc::new(assemble(&config, &collaborators));
    info!(
        event_name = "system.bootstrap.orchestrator_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        calendar_enabled = config.calendar.enabled,
        "orchestrator wired"
    );

    Ok(Application { config, db_pool, orchestrator, collaborators })
}
