use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classifier::Category;
use crate::handlers::{Handler, HandlerRequest};
use crate::llm::{CompletionRequest, LlmClient, PromptRole};

const CONTEXT_TURNS: usize = 3;

const UNAVAILABLE: &str = "I'm sorry, I'm having trouble processing your request at the moment. \
     Please try again later or contact HR directly for assistance.";

/// Keyed by the phrase looked for in the message.
const POLICIES: [(&str, &str); 5] = [
    ("working hours", "Standard working hours are 9 AM to 5 PM, Monday through Friday."),
    (
        "dress code",
        "Business casual attire is expected during regular working days. Formal attire for client meetings.",
    ),
    (
        "holidays",
        "The company observes national holidays. Please refer to the annual calendar for specific dates.",
    ),
    ("work from home", "Employees may work from home up to 2 days per week with manager approval."),
    (
        "benefits",
        "Health insurance, retirement plan, and annual bonuses are available for all full-time employees.",
    ),
];

const FAQS: [(&str, &str); 5] = [
    (
        "how do i apply for leave",
        "Just tell me the leave type and the dates, for example: 'I want to take annual leave \
         from 2024-05-15 to 2024-05-18 for a family vacation.'",
    ),
    (
        "what is the probation period",
        "The standard probation period is 3 months from your date of joining.",
    ),
    ("how many sick days do i get", "Full-time employees receive 10 paid sick days per year."),
    (
        "when are performance reviews",
        "Performance reviews are conducted bi-annually in June and December.",
    ),
    (
        "how do i submit expenses",
        "Submit your expenses through the Finance portal with relevant receipts within 30 days of incurring them.",
    ),
];

/// The default handler: canned policy snippets and FAQs first, the NLU gateway otherwise.
pub struct GeneralHrHandler {
    llm: Arc<dyn LlmClient>,
}

impl GeneralHrHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn canned_answer(message: &str) -> Option<String> {
        let lowered = message.to_lowercase();
        if let Some((topic, text)) = POLICIES.iter().find(|(topic, _)| lowered.contains(topic)) {
            return Some(format!("Policy on {topic}: {text}"));
        }
        FAQS.iter()
            .find(|(question, _)| lowered.contains(question))
            .map(|(_, answer)| answer.to_string())
    }

    fn prompt(request: &HandlerRequest<'_>) -> String {
        let recent = request.context.render_recent(CONTEXT_TURNS);
        format!(
            "You are an HR Assistant for a company. Respond to the following query from an employee.\n\n\
             USER INFORMATION:\nRole: {}\nName: {}\n\n\
             RECENT CONVERSATION:\n{}\n\n\
             CURRENT QUERY:\n{}\n\n\
             Provide a helpful, concise response. If you don't have specific information on a company policy, \
             give general HR best practices but make it clear that the employee should confirm with their HR department.\n\n\
             For sensitive or complex HR issues (like harassment, compensation disputes, termination), advise the \
             employee to contact HR directly rather than providing specific guidance.",
            request.role(),
            request.profile.display_name,
            if recent.is_empty() { "No recent context" } else { recent.as_str() },
            request.message
        )
    }
}

#[async_trait]
impl Handler for GeneralHrHandler {
    fn category(&self) -> Category {
        Category::GeneralHr
    }

    async fn process(&self, request: &HandlerRequest<'_>) -> String {
        if let Some(answer) = Self::canned_answer(request.message) {
            debug!(
                event_name = "general.answer.canned",
                correlation_id = request.correlation_id,
                "answered from canned HR content"
            );
            return answer;
        }

        let completion = CompletionRequest::new(
            Self::prompt(request),
            request.user_id().0.clone(),
            PromptRole::for_role(request.role()),
        );
        match self.llm.complete(&completion).await {
            Ok(answer) => answer.trim().to_string(),
            Err(error) => {
                warn!(
                    event_name = "general.answer.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %error,
                    "general HR answer unavailable"
                );
                UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use leavedesk_core::domain::conversation::ConversationContext;
    use leavedesk_core::domain::user::{Role, UserId, UserProfile};

    use super::{GeneralHrHandler, UNAVAILABLE};
    use crate::errors::GatewayError;
    use crate::handlers::{Handler, HandlerRequest};
    use crate::llm::ScriptedLlmClient;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: UserId("U-1".to_string()),
            display_name: "Jane Roe".to_string(),
            email: None,
            role: Role::Employee,
        }
    }

    #[test]
    fn policy_snippets_win_over_faqs() {
        assert_eq!(
            GeneralHrHandler::canned_answer("What are the WORKING HOURS here?").as_deref(),
            Some("Policy on working hours: Standard working hours are 9 AM to 5 PM, Monday through Friday.")
        );
        assert_eq!(
            GeneralHrHandler::canned_answer("what is the probation period?").as_deref(),
            Some("The standard probation period is 3 months from your date of joining.")
        );
        assert!(GeneralHrHandler::canned_answer("tell me a joke").is_none());
    }

    #[tokio::test]
    async fn free_questions_go_to_the_gateway_with_the_last_three_turns() {
        let scripted =
            ScriptedLlmClient::new().reply_when("CURRENT QUERY", "  We support volunteering days. ");
        let llm = Arc::new(scripted);
        let handler = GeneralHrHandler::new(llm.clone());
        let mut context = ConversationContext::new();
        context.push_exchange("first question", "first answer", Utc::now());
        context.push_exchange("second question", "second answer", Utc::now());
        let profile = profile();
        let request = HandlerRequest {
            message: "Do we get volunteering days?",
            profile: &profile,
            context: &context,
            correlation_id: "req-1",
        };

        assert_eq!(handler.process(&request).await, "We support volunteering days.");
        let prompt = &llm.requests()[0].prompt;
        assert!(!prompt.contains("first question"));
        assert!(prompt.contains("User: second question"));
    }

    #[tokio::test]
    async fn gateway_failures_become_an_apology() {
        let llm = ScriptedLlmClient::new()
            .fail_when("CURRENT QUERY", GatewayError::Transport("down".to_string()));
        let handler = GeneralHrHandler::new(Arc::new(llm));
        let profile = profile();
        let context = ConversationContext::new();
        let request = HandlerRequest {
            message: "hello",
            profile: &profile,
            context: &context,
            correlation_id: "req-2",
        };
        assert_eq!(handler.process(&request).await, UNAVAILABLE);
    }
}
