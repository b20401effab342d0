use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leavedesk_core::config::CalendarConfig;
use leavedesk_core::domain::leave::DATE_FORMAT;
use leavedesk_db::repositories::LeaveRecord;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::GatewayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarAction {
    CreateEvent,
    DeleteEvent,
}

/// Body posted to the calendar collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub action: CalendarAction,
    pub user_email: String,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalendarEvent {
    pub fn for_leave(action: CalendarAction, record: &LeaveRecord) -> Self {
        let request = &record.request;
        let description = match action {
            CalendarAction::CreateEvent => Some(request.reason.clone()),
            CalendarAction::DeleteEvent => None,
        };
        Self {
            action,
            user_email: record.employee_email.clone(),
            title: format!("{} Leave", request.kind.label()),
            start_date: request.window.start().format(DATE_FORMAT).to_string(),
            end_date: request.window.end().format(DATE_FORMAT).to_string(),
            description,
        }
    }
}

/// Best-effort side effects triggered by lifecycle transitions.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// `Ok(false)` means the collaborator answered but did not apply the change.
    async fn apply(&self, event: &CalendarEvent) -> Result<bool, GatewayError>;
}

pub fn gateway_from_config(
    config: &CalendarConfig,
) -> Result<Arc<dyn CalendarGateway>, GatewayError> {
    if !config.enabled {
        return Ok(Arc::new(NoopCalendarGateway));
    }
    Ok(Arc::new(WebhookCalendarGateway::from_config(config)?))
}

pub struct WebhookCalendarGateway {
    url: String,
    api_key: Option<SecretString>,
    http: reqwest::Client,
}

impl WebhookCalendarGateway {
    pub fn from_config(config: &CalendarConfig) -> Result<Self, GatewayError> {
        let url = config.webhook_url.clone().ok_or_else(|| {
            GatewayError::NotConfigured("calendar.webhook_url is required when enabled".to_string())
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::NotConfigured(error.to_string()))?;
        Ok(Self { url, api_key: config.api_key.clone(), http })
    }
}

#[async_trait]
impl CalendarGateway for WebhookCalendarGateway {
    async fn apply(&self, event: &CalendarEvent) -> Result<bool, GatewayError> {
        let mut builder = self.http.post(&self.url).json(event);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| GatewayError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await.map_err(|error| GatewayError::Decode(error.to_string()))?;
        Ok(acknowledged(&body))
    }
}

/// A 2xx answer counts as success unless the body says `"success": false`.
fn acknowledged(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| payload.get("success").and_then(Value::as_bool))
        .unwrap_or(true)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCalendarGateway;

#[async_trait]
impl CalendarGateway for NoopCalendarGateway {
    async fn apply(&self, event: &CalendarEvent) -> Result<bool, GatewayError> {
        debug!(
            event_name = "effects.calendar.skipped",
            action = ?event.action,
            "calendar integration disabled"
        );
        Ok(true)
    }
}

/// Test double keeping every event it receives.
#[derive(Clone, Default)]
pub struct RecordingCalendarGateway {
    events: Arc<Mutex<Vec<CalendarEvent>>>,
    fail: bool,
}

impl RecordingCalendarGateway {
    /// Records events and then reports a transport failure for each of them.
    pub fn failing() -> Self {
        Self { events: Arc::default(), fail: true }
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CalendarGateway for RecordingCalendarGateway {
    async fn apply(&self, event: &CalendarEvent) -> Result<bool, GatewayError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        if self.fail {
            return Err(GatewayError::Transport("calendar webhook unreachable".to_string()));
        }
        Ok(true)
    }
}
