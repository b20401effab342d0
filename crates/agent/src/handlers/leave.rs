use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use leavedesk_core::domain::leave::{parse_date, LeaveKind, LeaveRequestId, LeaveStatus};
use leavedesk_core::errors::ApplicationError;
use leavedesk_core::flows::LeaveEvent;
use leavedesk_core::selector::{LeaveSelector, SelectorResolution};
use tracing::{error, info, warn};

use crate::classifier::Category;
use crate::errors::{ExtractionError, LeaveEngineError};
use crate::extraction::{
    ApprovalFields, CancellationFields, DateRangeFields, ExtractionSchema, LeaveRequestFields,
    ListingFields, ReportFields,
};
use crate::handlers::{extract, token, Handler, HandlerRequest, NluError};
use crate::lifecycle::{
    render_ambiguous_employee, render_balance, render_employee_not_found, LeaveEngine, ListFilter,
    ReportKind, SubmitOutcome, PERMISSION_DENIED_APPROVAL, PERMISSION_DENIED_REPORTS,
};
use crate::llm::{CompletionRequest, LlmClient, PromptRole};

const SUBMIT_REPHRASE: &str = "I'm having trouble understanding your leave request. \
     Could you please provide your leave details in a clearer format? For example: \
     'I want to take annual leave from May 15 to May 18 for a family vacation.'";
const SUBMIT_FAILED: &str = "I encountered an error while processing your leave request. \
     Please try again or contact HR directly.";
const APPROVAL_REPHRASE: &str = "I'm having trouble understanding your approval request. \
     Please try again with a clearer format like 'Approve John's leave request' or 'Reject leave request #123'.";
const APPROVAL_UNKNOWN_DECISION: &str =
    "Please specify whether you want to 'approve' or 'reject' this leave request.";
const CANCEL_REPHRASE: &str = "I'm having trouble understanding your cancellation request. \
     Please try again with a clearer format like 'Cancel my leave for next week' or 'Cancel leave request #123'.";
const LIST_REPHRASE: &str = "I'm having trouble understanding your request. \
     Please try again with a clearer format like 'Show my pending leaves' or \
     'List John's approved leaves for next month'.";
const REPORT_REPHRASE: &str = "I'm having trouble understanding your report request. \
     Please try again with a clearer format like 'Show my team's leave calendar' or 'Upcoming leave report'.";
const POLICY_UNAVAILABLE: &str = "I'm sorry, I'm having trouble answering your question about our leave policies. \
     Please contact HR for more information or try asking in a different way.";
const LEAVE_FAILED: &str = "I encountered an error while working on your leave request. \
     Please try again or contact HR directly.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveIntent {
    Request,
    Approval,
    Balance,
    Cancel,
    List,
    Report,
    General,
}

impl LeaveIntent {
    /// Unrecognised answers fall back to a general policy question.
    pub fn parse_lossy(token: &str) -> Self {
        match token {
            "request" => Self::Request,
            "approval" => Self::Approval,
            "balance" => Self::Balance,
            "cancel" => Self::Cancel,
            "list" => Self::List,
            "report" => Self::Report,
            _ => Self::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Approval => "approval",
            Self::Balance => "balance",
            Self::Cancel => "cancel",
            Self::List => "list",
            Self::Report => "report",
            Self::General => "general",
        }
    }
}

fn decision_event(decision: Option<&str>) -> Option<LeaveEvent> {
    match decision? {
        "approve" | "approved" | "accept" => Some(LeaveEvent::Approve),
        "reject" | "rejected" | "deny" | "decline" => Some(LeaveEvent::Reject),
        _ => None,
    }
}

fn optional_date(value: Option<&String>) -> Result<Option<NaiveDate>, ExtractionError> {
    value
        .map(|value| parse_date(value))
        .transpose()
        .map_err(|_| ExtractionError::WrongType { key: "date", expected: "YYYY-MM-DD date" })
}

/// Leave requests, decisions, cancellations, listings, balances, reports and policy questions.
pub struct LeaveHandler {
    llm: Arc<dyn LlmClient>,
    engine: Arc<LeaveEngine>,
}

impl LeaveHandler {
    pub fn new(llm: Arc<dyn LlmClient>, engine: Arc<LeaveEngine>) -> Self {
        Self { llm, engine }
    }

    async fn sub_intent(&self, request: &HandlerRequest<'_>) -> LeaveIntent {
        let prompt = format!(
            "As a leave management classifier, determine what type of leave action is being requested in this message:\n\n\
             USER: {} ({})\nMESSAGE: {}\n\n\
             Classify into exactly ONE of these categories:\n\
             - request: User wants to apply for leave\n\
             - approval: User wants to approve or reject someone's leave (if they're HR/manager)\n\
             - balance: User is asking about leave balance or entitlement\n\
             - cancel: User wants to cancel an existing leave request\n\
             - list: User wants to see pending or approved leaves\n\
             - report: User wants a leave report such as usage, upcoming leaves or a team calendar\n\
             - general: General questions about leave policy or other leave-related queries\n\n\
             Respond with ONLY the category name without any explanation.",
            request.profile.display_name,
            request.role(),
            request.message
        );
        match token(self.llm.as_ref(), prompt, request.user_id()).await {
            Ok(answer) => LeaveIntent::parse_lossy(&answer),
            Err(gateway_error) => {
                warn!(
                    event_name = "leave.intent.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "leave sub-intent unavailable, answering as a policy question"
                );
                LeaveIntent::General
            }
        }
    }

    async fn structured<T: ExtractionSchema>(
        &self,
        request: &HandlerRequest<'_>,
        prompt: String,
    ) -> Result<T, NluError> {
        let result = extract::<T>(self.llm.as_ref(), prompt, request.user_id()).await;
        if let Err(nlu_error) = &result {
            warn!(
                event_name = "leave.extraction.failed",
                correlation_id = request.correlation_id,
                error = %nlu_error,
                "structured leave extraction discarded"
            );
        }
        result
    }

    fn engine_failure(request: &HandlerRequest<'_>, engine_error: LeaveEngineError) {
        let failure = ApplicationError::from(engine_error).into_interface(request.correlation_id);
        error!(
            event_name = "leave.engine.failed",
            correlation_id = failure.correlation_id(),
            user_id = %request.user_id(),
            error = %failure,
            "leave operation failed"
        );
    }

    async fn submit(&self, request: &HandlerRequest<'_>) -> String {
        let kinds = LeaveKind::ALL.iter().map(LeaveKind::as_str).collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "Extract the following leave request details from this message:\n\n\
             MESSAGE: {}\n\nToday is {}.\n\n\
             Extract and return as JSON with these keys:\n\
             - leave_type: ({kinds})\n\
             - start_date: (YYYY-MM-DD format)\n\
             - end_date: (YYYY-MM-DD format)\n\
             - reason: (brief reason for leave)\n\
             - half_day: (true if half day requested, false otherwise)\n\
             - employee_name: (the employee the leave is for, only if it is someone other than the sender)\n\n\
             If any information is missing, use null for that field.\n\
             Return ONLY the JSON object without explanation.",
            request.message,
            self.engine.today()
        );
        let fields: LeaveRequestFields = match self.structured(request, prompt).await {
            Ok(fields) => fields,
            Err(NluError::Extraction(_)) => return SUBMIT_REPHRASE.to_string(),
            Err(NluError::Gateway(_)) => return SUBMIT_FAILED.to_string(),
        };

        let (employee_id, on_behalf_of) = match fields.employee_name.as_deref() {
            Some(name) if request.role().is_hr() => match self.engine.resolve_employee(name).await {
                Ok(SelectorResolution::Unique(user)) => (user.id, Some(user.username)),
                Ok(SelectorResolution::NotFound) => return render_employee_not_found(name),
                Ok(SelectorResolution::Ambiguous { candidates, total }) => {
                    return render_ambiguous_employee(name, &candidates, total)
                }
                Err(engine_error) => {
                    Self::engine_failure(request, engine_error);
                    return SUBMIT_FAILED.to_string();
                }
            },
            _ => (request.user_id().clone(), None),
        };

        let outcome = match self.engine.submit(&employee_id, &fields, on_behalf_of).await {
            Ok(outcome) => outcome,
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                return SUBMIT_FAILED.to_string();
            }
        };
        let mut response = outcome.render();

        if let SubmitOutcome::Submitted { request: created, .. } = &outcome {
            match self
                .engine
                .check_eligibility(&employee_id, created.kind.as_str(), created.window)
                .await
            {
                Ok(verdict) => {
                    for note in verdict.reason.iter().chain(verdict.warning.iter()) {
                        response.push_str(&format!("\n\nNote: {note}"));
                    }
                }
                Err(engine_error) => Self::engine_failure(request, engine_error),
            }
        }
        response
    }

    async fn decide(&self, request: &HandlerRequest<'_>) -> String {
        if !request.role().can_decide_leave() {
            return PERMISSION_DENIED_APPROVAL.to_string();
        }
        let prompt = format!(
            "Extract leave approval details from this message:\n\n\
             MESSAGE: {}\n\n\
             Extract and return as JSON with these keys:\n\
             - request_id: (the ID of the leave request to approve or reject, if mentioned)\n\
             - employee_name: (the name of the employee whose leave is being decided, if mentioned)\n\
             - decision: (approve/reject)\n\
             - comment: (any comment provided for the decision)\n\n\
             If any information is missing, use null for that field.\n\
             Return ONLY the JSON object without explanation.",
            request.message
        );
        let fields: ApprovalFields = match self.structured(request, prompt).await {
            Ok(fields) => fields,
            Err(_) => return APPROVAL_REPHRASE.to_string(),
        };
        let Some(event) = decision_event(fields.decision.as_deref()) else {
            return APPROVAL_UNKNOWN_DECISION.to_string();
        };

        let selector = LeaveSelector {
            request_id: fields.request_id.map(LeaveRequestId),
            employee_name: fields.employee_name,
            ..LeaveSelector::default()
        };
        match self
            .engine
            .decide(event, &selector, request.profile, fields.comment, request.correlation_id)
            .await
        {
            Ok(outcome) => outcome.render(event, request.user_id()),
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                LEAVE_FAILED.to_string()
            }
        }
    }

    async fn cancel(&self, request: &HandlerRequest<'_>) -> String {
        let prompt = format!(
            "Extract leave cancellation details from this message:\n\n\
             MESSAGE: {}\n\nToday is {}.\n\n\
             Extract and return as JSON with these keys:\n\
             - request_id: (the ID of the leave request to cancel, if mentioned)\n\
             - start_date: (start date of the leave to cancel in YYYY-MM-DD format, if mentioned)\n\
             - end_date: (end date of the leave to cancel in YYYY-MM-DD format, if mentioned)\n\
             - employee_name: (the employee whose leave is cancelled, only if it is someone other than the sender)\n\n\
             If you can only determine one date, set both dates to that date.\n\
             If any information is missing, use null for that field.\n\
             Return ONLY the JSON object without explanation.",
            request.message,
            self.engine.today()
        );
        let Ok(fields) = self.structured::<CancellationFields>(request, prompt).await else {
            return CANCEL_REPHRASE.to_string();
        };
        let (Ok(start_date), Ok(end_date)) =
            (optional_date(fields.start_date.as_ref()), optional_date(fields.end_date.as_ref()))
        else {
            return CANCEL_REPHRASE.to_string();
        };

        let selector = LeaveSelector {
            request_id: fields.request_id.map(LeaveRequestId),
            employee_name: fields.employee_name,
            start_date,
            end_date,
        };
        match self.engine.cancel(&selector, request.profile, request.correlation_id).await {
            Ok(outcome) => outcome.render(LeaveEvent::Cancel, request.user_id()),
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                LEAVE_FAILED.to_string()
            }
        }
    }

    async fn balance(&self, request: &HandlerRequest<'_>) -> String {
        let year = self.engine.today().year();
        match self.engine.compute_balance(request.user_id(), year).await {
            Ok(report) => render_balance(&report),
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                LEAVE_FAILED.to_string()
            }
        }
    }

    async fn list(&self, request: &HandlerRequest<'_>) -> String {
        let prompt = format!(
            "Extract leave listing parameters from this message:\n\n\
             MESSAGE: {}\n\n\
             Extract and return as JSON with these keys:\n\
             - status: (pending, approved, rejected, cancelled, all)\n\
             - employee_name: (name of employee if HR/manager is asking about someone else)\n\
             - time_frame: (any time frame mentioned like 'this month', 'next week', etc.)\n\n\
             If any information is missing, use null for that field.\n\
             Return ONLY the JSON object without explanation.",
            request.message
        );
        let Ok(fields) = self.structured::<ListingFields>(request, prompt).await else {
            return LIST_REPHRASE.to_string();
        };
        let status = fields.status.as_deref().and_then(|status| status.parse::<LeaveStatus>().ok());

        let mut filter = ListFilter {
            employee_name: fields.employee_name.clone(),
            status,
            ..ListFilter::default()
        };
        if let Some(time_frame) = &fields.time_frame {
            let prompt = format!(
                "Parse this time frame and return date ranges: {time_frame}\n\n\
                 Today is {}.\n\n\
                 Return as JSON with these keys:\n\
                 - start_date: (YYYY-MM-DD format)\n\
                 - end_date: (YYYY-MM-DD format)\n\n\
                 Return ONLY the JSON object without explanation.",
                self.engine.today()
            );
            let range = match self.structured::<DateRangeFields>(request, prompt).await {
                Ok(range) => range,
                Err(_) => return LIST_REPHRASE.to_string(),
            };
            match (
                optional_date(range.start_date.as_ref()),
                optional_date(range.end_date.as_ref()),
            ) {
                (Ok(start), Ok(end)) => {
                    filter.start_on_or_after = start;
                    filter.start_on_or_before = end;
                }
                _ => return LIST_REPHRASE.to_string(),
            }
        }

        match self.engine.list(request.profile, &filter).await {
            Ok(outcome) => outcome.render(
                status.map(|status| status.as_str()),
                fields.time_frame.as_deref(),
            ),
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                LEAVE_FAILED.to_string()
            }
        }
    }

    async fn report(&self, request: &HandlerRequest<'_>) -> String {
        if !request.role().can_decide_leave() {
            return PERMISSION_DENIED_REPORTS.to_string();
        }
        let prompt = format!(
            "Extract leave report parameters from this message:\n\n\
             MESSAGE: {}\n\n\
             Extract and return as JSON with these keys:\n\
             - report_type: (usage, calendar, upcoming, department)\n\
             - department: (department name if specified)\n\
             - time_frame: (any time frame like 'this month', 'last quarter', etc.)\n\n\
             If any information is missing, use null for that field.\n\
             Return ONLY the JSON object without explanation.",
            request.message
        );
        let Ok(fields) = self.structured::<ReportFields>(request, prompt).await else {
            return REPORT_REPHRASE.to_string();
        };
        let kind = ReportKind::parse_lossy(fields.report_type.as_deref());
        match self.engine.report(request.profile, kind, fields.department).await {
            Ok(outcome) => outcome.render(),
            Err(engine_error) => {
                Self::engine_failure(request, engine_error);
                LEAVE_FAILED.to_string()
            }
        }
    }

    async fn policy_question(&self, request: &HandlerRequest<'_>) -> String {
        let prompt = format!(
            "Answer this leave policy related question:\n\n\
             USER ROLE: {}\nQUESTION: {}\n\n\
             Use these company leave policies:\n{}\n\n\
             Answer concisely and professionally.",
            request.role(),
            request.message,
            self.engine.policy().describe()
        );
        let completion = CompletionRequest::new(
            prompt,
            request.user_id().0.clone(),
            PromptRole::for_role(request.role()),
        );
        match self.llm.complete(&completion).await {
            Ok(answer) => answer.trim().to_string(),
            Err(gateway_error) => {
                warn!(
                    event_name = "leave.policy.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "leave policy answer unavailable"
                );
                POLICY_UNAVAILABLE.to_string()
            }
        }
    }
}

#[async_trait]
impl Handler for LeaveHandler {
    fn category(&self) -> Category {
        Category::LeaveManager
    }

    async fn process(&self, request: &HandlerRequest<'_>) -> String {
        let intent = self.sub_intent(request).await;
        info!(
            event_name = "leave.intent.resolved",
            correlation_id = request.correlation_id,
            user_id = %request.user_id(),
            intent = intent.as_str(),
            "leave sub-intent resolved"
        );

        match intent {
            LeaveIntent::Request => self.submit(request).await,
            LeaveIntent::Approval => self.decide(request).await,
            LeaveIntent::Balance => self.balance(request).await,
            LeaveIntent::Cancel => self.cancel(request).await,
            LeaveIntent::List => self.list(request).await,
            LeaveIntent::Report => self.report(request).await,
            LeaveIntent::General => self.policy_question(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use leavedesk_core::flows::LeaveEvent;

    use super::{decision_event, optional_date, LeaveIntent};

    #[test]
    fn sub_intents_fall_back_to_general() {
        assert_eq!(LeaveIntent::parse_lossy("approval"), LeaveIntent::Approval);
        assert_eq!(LeaveIntent::parse_lossy("report"), LeaveIntent::Report);
        assert_eq!(LeaveIntent::parse_lossy("book a flight"), LeaveIntent::General);
    }

    #[test]
    fn decisions_accept_common_verb_forms() {
        assert_eq!(decision_event(Some("approved")), Some(LeaveEvent::Approve));
        assert_eq!(decision_event(Some("deny")), Some(LeaveEvent::Reject));
        assert_eq!(decision_event(Some("maybe")), None);
        assert_eq!(decision_event(None), None);
    }

    #[test]
    fn malformed_dates_are_extraction_failures() {
        assert!(optional_date(Some(&"next friday".to_string())).is_err());
        assert_eq!(optional_date(None).expect("no date"), None);
    }
}
