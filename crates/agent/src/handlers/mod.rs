//! Category handlers and the registry the orchestrator dispatches through.

pub mod employee;
pub mod general;
pub mod leave;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use leavedesk_core::domain::conversation::ConversationContext;
use leavedesk_core::domain::user::{Role, UserId, UserProfile};
use thiserror::Error;

use crate::classifier::Category;
use crate::errors::{ExtractionError, GatewayError};
use crate::extraction::{self, ExtractionSchema};
use crate::llm::{CompletionRequest, LlmClient};

pub use employee::EmployeeRecordsHandler;
pub use general::GeneralHrHandler;
pub use leave::LeaveHandler;

/// Everything a handler may look at for one inbound message.
#[derive(Clone, Copy, Debug)]
pub struct HandlerRequest<'a> {
    pub message: &'a str,
    pub profile: &'a UserProfile,
    pub context: &'a ConversationContext,
    pub correlation_id: &'a str,
}

impl HandlerRequest<'_> {
    pub fn user_id(&self) -> &UserId {
        &self.profile.user_id
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }
}

/// One implementation per category. Handlers recover from every failure and
/// always answer with text the caller can read.
#[async_trait]
pub trait Handler: Send + Sync {
    fn category(&self) -> Category;

    async fn process(&self, request: &HandlerRequest<'_>) -> String;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<Category, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any handler already registered for the same category.
    pub fn register(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(handler.category(), handler);
        self
    }

    pub fn get(&self, category: Category) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&category).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.handlers.keys().copied().collect();
        categories.sort();
        categories
    }
}

#[derive(Debug, Error)]
pub(crate) enum NluError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Asks the NLU gateway for a structured answer and validates its shape.
pub(crate) async fn extract<T: ExtractionSchema>(
    llm: &dyn LlmClient,
    prompt: String,
    caller: &UserId,
) -> Result<T, NluError> {
    let raw = llm.complete(&CompletionRequest::system(prompt, caller.0.clone())).await?;
    Ok(extraction::parse::<T>(&raw)?)
}

/// Asks for a single bare token, lowercased and trimmed.
pub(crate) async fn token(
    llm: &dyn LlmClient,
    prompt: String,
    caller: &UserId,
) -> Result<String, GatewayError> {
    let raw = llm.complete(&CompletionRequest::system(prompt, caller.0.clone())).await?;
    Ok(raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .trim()
        .to_ascii_lowercase())
}
