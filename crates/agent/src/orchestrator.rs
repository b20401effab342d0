use std::sync::Arc;

use leavedesk_core::clock::Clock;
use leavedesk_core::config::RoutingConfig;
use leavedesk_core::domain::conversation::ConversationContext;
use leavedesk_core::domain::user::UserProfile;
use leavedesk_db::repositories::ConversationRepository;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::classifier::{Category, IntentClassifier};
use crate::handlers::{HandlerRegistry, HandlerRequest};
use crate::llm::{CompletionRequest, LlmClient};

const NO_HANDLER: &str = "I'm sorry, I'm not able to help with that right now. \
     Please contact HR directly for assistance.";

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingPolicy {
    pub confidence_threshold: f64,
    pub hr_override_phrases: Vec<String>,
    pub context_turns: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            hr_override_phrases: vec![
                "force leave".to_string(),
                "override".to_string(),
                "admin action".to_string(),
            ],
            context_turns: 10,
        }
    }
}

impl RoutingPolicy {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            hr_override_phrases: config
                .hr_override_phrases
                .iter()
                .map(|phrase| phrase.to_lowercase())
                .collect(),
            context_turns: config.context_turns,
        }
    }

    fn hr_override(&self, profile: &UserProfile, message: &str) -> bool {
        if !profile.role.is_hr() {
            return false;
        }
        let lowered = message.to_lowercase();
        self.hr_override_phrases.iter().any(|phrase| lowered.contains(phrase.as_str()))
    }
}

/// What one routed message produced, including the context to carry into the next one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteOutcome {
    pub correlation_id: String,
    pub response: String,
    pub category: Category,
    pub confidence: f64,
    pub overridden: bool,
    pub arbitrated: bool,
    #[serde(skip)]
    pub context: ConversationContext,
}

enum Selection {
    Primary,
    Backup,
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    handlers: HandlerRegistry,
    conversations: Arc<dyn ConversationRepository>,
    llm: Arc<dyn LlmClient>,
    clock: Arc<dyn Clock>,
    policy: RoutingPolicy,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        handlers: HandlerRegistry,
        conversations: Arc<dyn ConversationRepository>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { classifier, handlers, conversations, llm, clock, policy: RoutingPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Classify, dispatch, log the exchange, then arbitrate a low-confidence answer.
    ///
    /// The steps run strictly in that order. Failures in logging or arbitration never
    /// change the caller-visible outcome beyond falling back to the primary answer.
    pub async fn route(
        &self,
        message: &str,
        profile: &UserProfile,
        mut context: ConversationContext,
    ) -> RouteOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let classification = self.classifier.classify(message, profile, &context).await;

        let overridden = self.policy.hr_override(profile, message);
        let category = if overridden {
            info!(
                event_name = "router.intent.overridden",
                correlation_id = %correlation_id,
                user_id = %profile.user_id,
                from = classification.category.as_str(),
                "HR override phrase routed the message to leave management"
            );
            Category::LeaveManager
        } else {
            classification.category
        };

        let request = HandlerRequest {
            message,
            profile,
            context: &context,
            correlation_id: &correlation_id,
        };
        let primary = self.dispatch(category, &request).await;

        if let Err(log_error) = self
            .conversations
            .append_exchange(&profile.user_id, message, &primary, self.clock.now())
            .await
        {
            error!(
                event_name = "router.conversation.log_failed",
                correlation_id = %correlation_id,
                user_id = %profile.user_id,
                error = %log_error,
                "conversation log write failed"
            );
        }

        let needs_arbitration = !overridden
            && category != Category::DEFAULT
            && classification.confidence < self.policy.confidence_threshold;
        let response = if needs_arbitration {
            let backup = self.dispatch(Category::DEFAULT, &request).await;
            match self
                .arbitrate(&request, category, classification.confidence, &primary, &backup)
                .await
            {
                Selection::Primary => primary,
                Selection::Backup => backup,
            }
        } else {
            primary
        };

        context.push_exchange(message, response.clone(), self.clock.now());
        context.truncate_to(self.policy.context_turns);

        RouteOutcome {
            correlation_id,
            response,
            category,
            confidence: classification.confidence,
            overridden,
            arbitrated: needs_arbitration,
            context,
        }
    }

    async fn dispatch(&self, category: Category, request: &HandlerRequest<'_>) -> String {
        let handler = self.handlers.get(category).or_else(|| self.handlers.get(Category::DEFAULT));
        match handler {
            Some(handler) => handler.process(request).await,
            None => {
                error!(
                    event_name = "router.dispatch.unregistered",
                    correlation_id = request.correlation_id,
                    category = category.as_str(),
                    "no handler registered for category"
                );
                NO_HANDLER.to_string()
            }
        }
    }

    async fn arbitrate(
        &self,
        request: &HandlerRequest<'_>,
        category: Category,
        confidence: f64,
        primary: &str,
        backup: &str,
    ) -> Selection {
        let prompt = format!(
            "As an HRMS response evaluator, determine which of these responses better addresses the user's query:\n\n\
             USER QUERY: {}\n\n\
             RESPONSE FROM {} (confidence: {confidence}):\n{primary}\n\n\
             RESPONSE FROM {}:\n{backup}\n\n\
             Select the better response by answering with ONLY \"primary\" or \"backup\".",
            request.message,
            category.as_str().to_uppercase(),
            Category::DEFAULT.as_str().to_uppercase(),
        );

        let answer = match self.llm.complete(&CompletionRequest::system(prompt, "system")).await {
            Ok(answer) => answer.trim().to_lowercase(),
            Err(gateway_error) => {
                warn!(
                    event_name = "router.arbitration.failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "arbitration unavailable, keeping primary response"
                );
                return Selection::Primary;
            }
        };

        let selection = if answer.contains("primary") {
            Selection::Primary
        } else if answer.contains("backup") {
            Selection::Backup
        } else {
            warn!(
                event_name = "router.arbitration.failed",
                correlation_id = request.correlation_id,
                answer = %answer,
                "arbitration answer named neither response, keeping primary response"
            );
            return Selection::Primary;
        };
        info!(
            event_name = "router.arbitration.selected",
            correlation_id = request.correlation_id,
            selected = match selection {
                Selection::Primary => "primary",
                Selection::Backup => "backup",
            },
            "arbitration selected a response"
        );
        selection
    }
}
