use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use leavedesk_core::config::{LlmConfig, LlmProvider};
use leavedesk_core::domain::user::Role;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use crate::errors::GatewayError;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 1024;

/// Persona the NLU gateway answers as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptRole {
    Employee,
    Hr,
    /// Internal classification and extraction prompts.
    System,
}

impl PromptRole {
    pub fn for_role(role: Role) -> Self {
        if role.is_hr() {
            Self::Hr
        } else {
            Self::Employee
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Hr => "hr",
            Self::System => "system",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Employee => {
                "You are the assistant of an HR management system talking to an EMPLOYEE. \
                 You may explain company policy, help with leave balances and leave request status, \
                 help submit HR requests and answer general HR questions. You cannot approve or \
                 reject leave, access confidential employee records or change HR records. \
                 Be helpful, concise and professional."
            }
            Self::Hr => {
                "You are the assistant of an HR management system talking to an HR STAFF MEMBER. \
                 You help process leave approvals, update employee records and prepare HR reports. \
                 Confirm critical actions before executing them. \
                 Be efficient, detail-oriented and keep information confidential."
            }
            Self::System => {
                "You are a deterministic classification and extraction component of an HR \
                 management system. Answer exactly in the format requested, without commentary."
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub caller_id: String,
    pub role_context: PromptRole,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, caller_id: impl Into<String>, role: PromptRole) -> Self {
        Self { prompt: prompt.into(), caller_id: caller_id.into(), role_context: role }
    }

    pub fn system(prompt: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self::new(prompt, caller_id, PromptRole::System)
    }
}

/// The NLU gateway: an unreliable oracle returning free text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

pub struct HttpLlmClient {
    provider: LlmProvider,
    model: String,
    endpoint: String,
    api_key: Option<SecretString>,
    http: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GatewayError> {
        if config.provider != LlmProvider::Ollama && config.api_key.is_none() {
            return Err(GatewayError::NotConfigured(format!(
                "llm.api_key is required for provider {}",
                config.provider.as_str()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::NotConfigured(error.to_string()))?;

        Ok(Self {
            provider: config.provider,
            model: config.model.clone(),
            endpoint: endpoint(config.provider, config.base_url.as_deref()),
            api_key: config.api_key.clone(),
            http,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(500),
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let body = request_body(
            self.provider,
            &self.model,
            request.role_context.system_prompt(),
            &request.prompt,
        );

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = match self.provider {
                LlmProvider::OpenAi => builder.bearer_auth(api_key.expose_secret()),
                LlmProvider::Anthropic => builder
                    .header("x-api-key", api_key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION),
                LlmProvider::Ollama => builder,
            };
        }

        let response =
            builder.send().await.map_err(|error| GatewayError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        let payload: Value =
            response.json().await.map_err(|error| GatewayError::Decode(error.to_string()))?;
        completion_text(self.provider, &payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "nlu.request.retrying",
                        provider = self.provider.as_str(),
                        user_id = %request.caller_id,
                        attempt,
                        error = %error,
                        "nlu request failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn endpoint(provider: LlmProvider, base_url: Option<&str>) -> String {
    let base = match (provider, base_url) {
        (_, Some(base)) => base,
        (LlmProvider::OpenAi, None) => OPENAI_BASE_URL,
        (LlmProvider::Anthropic, None) => ANTHROPIC_BASE_URL,
        (LlmProvider::Ollama, None) => OLLAMA_BASE_URL,
    };
    let path = match provider {
        LlmProvider::OpenAi => "/v1/chat/completions",
        LlmProvider::Anthropic => "/v1/messages",
        LlmProvider::Ollama => "/api/generate",
    };
    format!("{}{path}", base.trim_end_matches('/'))
}

fn request_body(provider: LlmProvider, model: &str, system: &str, prompt: &str) -> Value {
    match provider {
        LlmProvider::OpenAi => json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        }),
        LlmProvider::Anthropic => json!({
            "model": model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "system": system,
            "messages": [{"role": "user", "content": prompt}],
        }),
        LlmProvider::Ollama => json!({
            "model": model,
            "system": system,
            "prompt": prompt,
            "stream": false,
        }),
    }
}

fn completion_text(provider: LlmProvider, payload: &Value) -> Result<String, GatewayError> {
    let pointer = match provider {
        LlmProvider::OpenAi => "/choices/0/message/content",
        LlmProvider::Anthropic => "/content/0/text",
        LlmProvider::Ollama => "/response",
    };
    let text = payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Decode(format!("missing `{pointer}` in completion")))?;

    if text.trim().is_empty() {
        return Err(GatewayError::EmptyCompletion);
    }
    Ok(text.to_string())
}

struct ScriptRule {
    needle: String,
    reply: Result<String, GatewayError>,
}

/// Test double answering by prompt content.
///
/// The first rule whose needle occurs in the prompt wins. Prompts that match no
/// rule fail with a transport error.
#[derive(Default)]
pub struct ScriptedLlmClient {
    rules: Vec<ScriptRule>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(ScriptRule { needle: needle.into(), reply: Ok(reply.into()) });
        self
    }

    pub fn fail_when(mut self, needle: impl Into<String>, error: GatewayError) -> Self {
        self.rules.push(ScriptRule { needle: needle.into(), reply: Err(error) });
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.requests().iter().filter(|request| request.prompt.contains(needle)).count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        self.rules
            .iter()
            .find(|rule| request.prompt.contains(&rule.needle))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| {
                Err(GatewayError::Transport("no scripted reply for prompt".to_string()))
            })
    }
}
