use std::sync::Arc;

use leavedesk_core::domain::conversation::ConversationContext;
use leavedesk_core::domain::user::UserProfile;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::{CompletionRequest, LlmClient};

pub const EXACT_MATCH_CONFIDENCE: f64 = 0.9;
pub const UNMATCHED_CONFIDENCE: f64 = 0.5;
pub const GATEWAY_FAILURE_CONFIDENCE: f64 = 0.3;

const CONTEXT_TURNS_IN_PROMPT: usize = 6;

/// Closed set of request types the router dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    LeaveManager,
    EmployeeManager,
    GeneralHr,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::LeaveManager, Self::EmployeeManager, Self::GeneralHr];

    /// Where unmatched or failed classifications land.
    pub const DEFAULT: Category = Self::GeneralHr;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveManager => "leave_manager",
            Self::EmployeeManager => "employee_manager",
            Self::GeneralHr => "general_hr",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::LeaveManager => {
                "leave requests, approvals, cancellations, listings, reports and leave balance inquiries"
            }
            Self::EmployeeManager => {
                "finding, extracting or changing specific information about someone in the HR records"
            }
            Self::GeneralHr => "general HR inquiries or anything that doesn't fit the categories above",
        }
    }

    /// Case-insensitive exact match after trimming whitespace, quotes and trailing periods.
    pub fn parse_exact(raw: &str) -> Option<Self> {
        let token = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .trim()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|category| category.as_str() == token)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub category: Category,
    /// Heuristic, not a calibrated probability.
    pub confidence: f64,
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn prompt(message: &str, profile: &UserProfile, context: &ConversationContext) -> String {
        let profile_json = serde_json::to_string(profile).unwrap_or_else(|_| "{}".to_string());
        let history = context.render_recent(CONTEXT_TURNS_IN_PROMPT);
        let categories = Category::ALL
            .iter()
            .map(|category| format!("- {}: {}", category.as_str(), category.description()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "As an HR intent classifier, decide which specialized HR handler should answer this request.\n\n\
             USER PROFILE:\n{profile_json}\n\n\
             CONVERSATION CONTEXT:\n{}\n\n\
             USER MESSAGE:\n{message}\n\n\
             Classify the intent into exactly ONE of these categories:\n{categories}\n\n\
             Respond with ONLY the category name, without any additional text or explanation.",
            if history.is_empty() { "(none)" } else { history.as_str() }
        )
    }

    pub async fn classify(
        &self,
        message: &str,
        profile: &UserProfile,
        context: &ConversationContext,
    ) -> Classification {
        let request = CompletionRequest::system(
            Self::prompt(message, profile, context),
            profile.user_id.0.clone(),
        );

        match self.llm.complete(&request).await {
            Ok(answer) => match Category::parse_exact(&answer) {
                Some(category) => {
                    info!(
                        event_name = "router.intent.classified",
                        user_id = %profile.user_id,
                        category = category.as_str(),
                        confidence = EXACT_MATCH_CONFIDENCE,
                        "intent classified"
                    );
                    Classification { category, confidence: EXACT_MATCH_CONFIDENCE }
                }
                None => {
                    warn!(
                        event_name = "router.intent.unmatched",
                        user_id = %profile.user_id,
                        answer = %answer.trim(),
                        "classifier answer matched no category, using default"
                    );
                    Classification { category: Category::DEFAULT, confidence: UNMATCHED_CONFIDENCE }
                }
            },
            Err(error) => {
                warn!(
                    event_name = "router.intent.gateway_failed",
                    user_id = %profile.user_id,
                    error = %error,
                    "classification failed, using default category"
                );
                Classification {
                    category: Category::DEFAULT,
                    confidence: GATEWAY_FAILURE_CONFIDENCE,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leavedesk_core::domain::conversation::ConversationContext;
    use leavedesk_core::domain::user::{Role, UserId, UserProfile};

    use super::{Category, Classification, IntentClassifier};
    use crate::errors::GatewayError;
    use crate::llm::ScriptedLlmClient;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: UserId("U-1".to_string()),
            display_name: "Jane Roe".to_string(),
            email: Some("jane@example.com".to_string()),
            role: Role::Employee,
        }
    }

    #[test]
    fn exact_tokens_parse_case_insensitively() {
        assert_eq!(Category::parse_exact("  Leave_Manager\n"), Some(Category::LeaveManager));
        assert_eq!(Category::parse_exact("\"employee_manager\"."), Some(Category::EmployeeManager));
        assert_eq!(Category::parse_exact("I think leave_manager"), None);
    }

    #[test]
    fn prompt_lists_every_category_and_the_profile() {
        let prompt = IntentClassifier::prompt("hello", &profile(), &ConversationContext::new());
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("\"display_name\":\"Jane Roe\""));
    }

    #[tokio::test]
    async fn confidence_reflects_how_the_answer_was_obtained() {
        let llm = ScriptedLlmClient::new()
            .reply_when("book time off", "leave_manager")
            .reply_when("what is the meaning", "philosophy")
            .fail_when("gateway down", GatewayError::Transport("timeout".to_string()));
        let classifier = IntentClassifier::new(Arc::new(llm));
        let context = ConversationContext::new();

        assert_eq!(
            classifier.classify("book time off", &profile(), &context).await,
            Classification { category: Category::LeaveManager, confidence: 0.9 }
        );
        assert_eq!(
            classifier.classify("what is the meaning", &profile(), &context).await,
            Classification { category: Category::GeneralHr, confidence: 0.5 }
        );
        assert_eq!(
            classifier.classify("gateway down", &profile(), &context).await,
            Classification { category: Category::GeneralHr, confidence: 0.3 }
        );
    }
}
