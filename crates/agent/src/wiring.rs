//! Builds a ready-to-route [`Orchestrator`] from configuration and storage.

use std::sync::Arc;

use leavedesk_core::clock::{Clock, SystemClock};
use leavedesk_core::config::AppConfig;
use leavedesk_db::repositories::{
    ConversationRepository, LeaveRequestRepository, SqlConversationRepository,
    SqlLeaveRequestRepository, SqlUserRepository, UserRepository,
};
use leavedesk_db::DbPool;

use crate::calendar::{gateway_from_config, CalendarGateway};
use crate::classifier::IntentClassifier;
use crate::directory::{directory_from_config, EmployeeDirectory};
use crate::errors::GatewayError;
use crate::handlers::{EmployeeRecordsHandler, GeneralHrHandler, HandlerRegistry, LeaveHandler};
use crate::lifecycle::{EngineSettings, LeaveEngine};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::orchestrator::{Orchestrator, RoutingPolicy};

/// Every collaborator the router needs. Tests swap in doubles field by field.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserRepository>,
    pub leaves: Arc<dyn LeaveRequestRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub llm: Arc<dyn LlmClient>,
    pub calendar: Arc<dyn CalendarGateway>,
    pub directory: Arc<dyn EmployeeDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Sqlite repositories plus the gateways named in `config`.
    pub fn from_config(config: &AppConfig, pool: DbPool) -> Result<Self, GatewayError> {
        Ok(Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            leaves: Arc::new(SqlLeaveRequestRepository::new(pool.clone())),
            conversations: Arc::new(SqlConversationRepository::new(pool)),
            llm: Arc::new(HttpLlmClient::from_config(&config.llm)?),
            calendar: gateway_from_config(&config.calendar)?,
            directory: directory_from_config(&config.employee_directory),
            clock: Arc::new(SystemClock),
        })
    }
}

pub fn assemble(config: &AppConfig, parts: &Collaborators) -> Orchestrator {
    let engine = Arc::new(
        LeaveEngine::new(parts.users.clone(), parts.leaves.clone(), parts.calendar.clone())
            .with_policy(config.leave.policy())
            .with_settings(EngineSettings::from_config(&config.leave))
            .with_clock(parts.clock.clone()),
    );

    let handlers = HandlerRegistry::new()
        .register(Arc::new(LeaveHandler::new(parts.llm.clone(), engine)))
        .register(Arc::new(EmployeeRecordsHandler::new(parts.llm.clone(), parts.directory.clone())))
        .register(Arc::new(GeneralHrHandler::new(parts.llm.clone())));

    Orchestrator::new(
        IntentClassifier::new(parts.llm.clone()),
        handlers,
        parts.conversations.clone(),
        parts.llm.clone(),
        parts.clock.clone(),
    )
    .with_policy(RoutingPolicy::from_config(&config.routing))
}
