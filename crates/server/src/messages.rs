use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use leavedesk_agent::{Category, Orchestrator};
use leavedesk_core::domain::conversation::ConversationContext;
use leavedesk_core::domain::user::{Role, User, UserId};
use leavedesk_core::errors::{ApplicationError, InterfaceError};
use leavedesk_db::repositories::{ConversationRepository, RepositoryError, UserRepository};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct MessagesState {
    pub orchestrator: Arc<Orchestrator>,
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub context_turns: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InboundMessage {
    /// Email address or phone number the message arrived from.
    pub contact: String,
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageReply {
    pub correlation_id: String,
    pub user_id: String,
    pub category: Category,
    pub confidence: f64,
    pub arbitrated: bool,
    pub response: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageError {
    pub error: String,
    pub correlation_id: String,
}

type Rejection = (StatusCode, Json<MessageError>);

pub fn router(state: MessagesState) -> Router {
    Router::new().route("/api/v1/messages", post(receive)).with_state(state)
}

pub async fn receive(
    State(state): State<MessagesState>,
    Json(body): Json<InboundMessage>,
) -> Result<Json<MessageReply>, Rejection> {
    let request_id = Uuid::new_v4().to_string();
    let contact = body.contact.trim();
    let text = body.text.trim();
    if contact.is_empty() || text.is_empty() {
        return Err(rejection(InterfaceError::BadRequest {
            message: "contact and text are required".to_string(),
            correlation_id: request_id,
        }));
    }

    let user = resolve_contact(state.users.as_ref(), contact)
        .await
        .map_err(|source| storage_failure(source, &request_id))?;
    let turns = state
        .conversations
        .recent_turns(&user.id, state.context_turns)
        .await
        .map_err(|source| storage_failure(source, &request_id))?;

    let outcome = state
        .orchestrator
        .route(text, &user.profile(), ConversationContext::from_turns(turns))
        .await;

    Ok(Json(MessageReply {
        correlation_id: outcome.correlation_id,
        user_id: user.id.0,
        category: outcome.category,
        confidence: outcome.confidence,
        arbitrated: outcome.arbitrated,
        response: outcome.response,
    }))
}

/// Finds the sender by email or phone, registering an employee on first contact.
pub async fn resolve_contact(
    users: &dyn UserRepository,
    contact: &str,
) -> Result<User, RepositoryError> {
    if let Some(user) = users.find_by_contact(contact).await? {
        return Ok(user);
    }

    let handle = Uuid::new_v4().simple().to_string();
    let short = &handle[..8];
    let (email, phone) = if contact.contains('@') {
        (contact.to_string(), None)
    } else {
        (format!("user_{short}@placeholder.com"), Some(contact.to_string()))
    };
    let user = User {
        id: UserId(format!("U-{handle}")),
        username: format!("user_{short}"),
        email,
        phone,
        role: Role::Employee,
        manager_id: None,
    };
    users.save(user.clone()).await?;
    info!(
        event_name = "server.user.registered",
        correlation_id = "first_contact",
        user_id = %user.id,
        "registered user on first contact"
    );
    Ok(user)
}

fn storage_failure(source: RepositoryError, request_id: &str) -> Rejection {
    let failure = ApplicationError::from(source).into_interface(request_id);
    error!(
        event_name = "server.message.storage_failed",
        correlation_id = failure.correlation_id(),
        error = %failure,
        "could not load sender or conversation"
    );
    rejection(failure)
}

fn rejection(failure: InterfaceError) -> Rejection {
    let status = match &failure {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(MessageError {
            error: failure.user_message().to_string(),
            correlation_id: failure.correlation_id().to_string(),
        }),
    )
}
