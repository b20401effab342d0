use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::{error, info, warn};

use crate::classifier::Category;
use crate::directory::EmployeeDirectory;
use crate::extraction::EmployeeUpdateFields;
use crate::handlers::{extract, token, Handler, HandlerRequest, NluError};
use crate::llm::{CompletionRequest, LlmClient, PromptRole};

const LOOKUP_DENIED: &str = "I'm sorry, you don't have permission to access employee information. \
     Please contact your HR department.";
const UPDATE_DENIED: &str = "I'm sorry, you don't have permission to update employee information. \
     Please contact your HR department.";
const NO_IDENTIFIER: &str = "I couldn't identify which employee you're referring to. \
     Please provide a phone number, name, or employee ID.";
const INCOMPLETE_UPDATE: &str = "I couldn't identify which employee to update or what information to update. \
     Please provide more details.";
const LOOKUP_FAILED: &str =
    "Sorry, I encountered an error while retrieving employee information. Please try again later.";
const UPDATE_FAILED: &str =
    "Sorry, I encountered an error while updating employee information. Please try again later.";
const QUERY_FAILED: &str = "I'm having trouble processing your request. \
     Please try again later or contact your HR department.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmployeeIntent {
    ExtractInfo,
    UpdateInfo,
    GeneralQuery,
}

impl EmployeeIntent {
    pub fn parse_lossy(token: &str) -> Self {
        match token {
            "extract_info" => Self::ExtractInfo,
            "update_info" => Self::UpdateInfo,
            _ => Self::GeneralQuery,
        }
    }
}

static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?\d{10,15}|\d{3}[-.\s]?\d{3}[-.\s]?\d{4})").expect("phone pattern is valid")
});

/// First phone-shaped run in `message`, reduced to digits and `+`.
pub fn find_phone_number(message: &str) -> Option<String> {
    PHONE_NUMBER.find(message).map(|found| {
        found.as_str().chars().filter(|c| c.is_ascii_digit() || *c == '+').collect()
    })
}

/// HR-only lookups and edits over the employee directory.
pub struct EmployeeRecordsHandler {
    llm: Arc<dyn LlmClient>,
    directory: Arc<dyn EmployeeDirectory>,
}

impl EmployeeRecordsHandler {
    pub fn new(llm: Arc<dyn LlmClient>, directory: Arc<dyn EmployeeDirectory>) -> Self {
        Self { llm, directory }
    }

    async fn sub_intent(&self, request: &HandlerRequest<'_>) -> EmployeeIntent {
        let profile = serde_json::to_string(request.profile).unwrap_or_else(|_| "{}".to_string());
        let prompt = format!(
            "As an Employee Manager intent classifier, determine what action the user wants to perform.\n\n\
             USER PROFILE:\n{profile}\n\n\
             USER MESSAGE:\n{}\n\n\
             Based on the message, classify into EXACTLY ONE of these categories:\n\
             - extract_info: User wants to retrieve information about an employee\n\
             - update_info: User wants to update information about an employee\n\
             - general_query: Any other employee-related query\n\n\
             Your response should be ONLY the category name without any additional text.",
            request.message
        );
        match token(self.llm.as_ref(), prompt, request.user_id()).await {
            Ok(answer) => EmployeeIntent::parse_lossy(&answer),
            Err(gateway_error) => {
                warn!(
                    event_name = "employee.intent.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "employee sub-intent unavailable, answering as a general query"
                );
                EmployeeIntent::GeneralQuery
            }
        }
    }

    async fn identifier(&self, request: &HandlerRequest<'_>) -> Result<Option<String>, NluError> {
        if let Some(phone) = find_phone_number(request.message) {
            return Ok(Some(phone));
        }
        let prompt = format!(
            "From this message, extract the employee identifier mentioned:\n\n\
             MESSAGE: {}\n\n\
             If there's a name, extract the full name.\n\
             If there's an employee ID, extract that.\n\
             If there's an email, extract that.\n\n\
             Return ONLY the extracted identifier without any additional text, or none if there is no identifier.",
            request.message
        );
        let raw = self
            .llm
            .complete(&CompletionRequest::system(prompt, request.user_id().0.clone()))
            .await?;
        let identifier = raw.trim().trim_matches('"').trim();
        if identifier.is_empty() || identifier.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        Ok(Some(identifier.to_string()))
    }

    async fn lookup(&self, request: &HandlerRequest<'_>) -> String {
        if !request.role().is_hr() {
            return LOOKUP_DENIED.to_string();
        }
        let identifier = match self.identifier(request).await {
            Ok(Some(identifier)) => identifier,
            Ok(None) => return NO_IDENTIFIER.to_string(),
            Err(nlu_error) => {
                warn!(
                    event_name = "employee.lookup.identifier_failed",
                    correlation_id = request.correlation_id,
                    error = %nlu_error,
                    "could not extract an employee identifier"
                );
                return LOOKUP_FAILED.to_string();
            }
        };

        match self.directory.lookup(&identifier).await {
            Ok(Some(row)) => {
                let mut response = "Employee Information:\n\n".to_string();
                for (column, value) in row {
                    response.push_str(&format!("{column}: {value}\n"));
                }
                response
            }
            Ok(None) => format!("I couldn't find any employee matching: {identifier}"),
            Err(directory_error) => {
                error!(
                    event_name = "employee.lookup.failed",
                    correlation_id = request.correlation_id,
                    error = %directory_error,
                    "employee directory lookup failed"
                );
                LOOKUP_FAILED.to_string()
            }
        }
    }

    async fn update(&self, request: &HandlerRequest<'_>) -> String {
        if !request.role().is_hr() {
            return UPDATE_DENIED.to_string();
        }
        let prompt = format!(
            "From this message, extract the employee identifier and the information to be updated:\n\n\
             MESSAGE: {}\n\n\
             Format your response as a JSON object with these fields:\n\
             - identifier: The employee identifier (phone number, name, or employee ID)\n\
             - updates: An object of fields to update with their new values\n\n\
             Example: {}\n\n\
             Return ONLY the JSON object without any additional text.",
            request.message,
            json!({
                "identifier": "+1234567890",
                "updates": {"Department": "Finance", "Position": "Senior Accountant"}
            })
        );
        let extracted =
            extract::<EmployeeUpdateFields>(self.llm.as_ref(), prompt, request.user_id()).await;
        let fields = match extracted {
            Ok(fields) => fields,
            Err(NluError::Extraction(extraction_error)) => {
                warn!(
                    event_name = "employee.update.extraction_malformed",
                    correlation_id = request.correlation_id,
                    error = %extraction_error,
                    "employee update extraction discarded"
                );
                return INCOMPLETE_UPDATE.to_string();
            }
            Err(NluError::Gateway(gateway_error)) => {
                warn!(
                    event_name = "employee.update.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "employee update extraction unavailable"
                );
                return UPDATE_FAILED.to_string();
            }
        };

        let Some(identifier) = fields.identifier.filter(|_| !fields.updates.is_empty()) else {
            return INCOMPLETE_UPDATE.to_string();
        };
        match self.directory.update(&identifier, &fields.updates).await {
            Ok(true) => {
                info!(
                    event_name = "employee.update.applied",
                    correlation_id = request.correlation_id,
                    actor = %request.user_id(),
                    fields = fields.updates.len(),
                    "employee record updated"
                );
                let names = fields.updates.keys().cloned().collect::<Vec<_>>().join(", ");
                format!("Successfully updated {names} for employee with identifier: {identifier}")
            }
            Ok(false) => format!("I couldn't find any employee matching: {identifier}"),
            Err(directory_error) => {
                error!(
                    event_name = "employee.update.failed",
                    correlation_id = request.correlation_id,
                    error = %directory_error,
                    "employee directory update failed"
                );
                UPDATE_FAILED.to_string()
            }
        }
    }

    async fn general_query(&self, request: &HandlerRequest<'_>) -> String {
        let prompt = format!(
            "You are an Employee Manager Assistant helping with HR queries.\n\n\
             USER ROLE: {}\nUSER QUERY: {}\n\n\
             Respond to this query about employee management, keeping in mind:\n\
             - If the user is not HR, be careful about sharing sensitive information\n\
             - Give concise, professional responses\n\
             - If you can't answer, suggest contacting HR",
            request.role(),
            request.message
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
                    event_name = "employee.query.gateway_failed",
                    correlation_id = request.correlation_id,
                    error = %gateway_error,
                    "employee query answer unavailable"
                );
                QUERY_FAILED.to_string()
            }
        }
    }
}

#[async_trait]
impl Handler for EmployeeRecordsHandler {
    fn category(&self) -> Category {
        Category::EmployeeManager
    }

    async fn process(&self, request: &HandlerRequest<'_>) -> String {
        match self.sub_intent(request).await {
            EmployeeIntent::ExtractInfo => self.lookup(request).await,
            EmployeeIntent::UpdateInfo => self.update(request).await,
            EmployeeIntent::GeneralQuery => self.general_query(request).await,
        }
    }
}
