use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leavedesk_core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use toml::Value;

use crate::commands::{prepare, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigLine {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

pub fn run() -> CommandResult {
    let (config, _runtime) = match prepare("config") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let lines = effective_lines(&config, config_file_doc.as_ref(), config_file_path.as_deref());

    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(lines),
    )
}

pub fn effective_lines(
    config: &AppConfig,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> Vec<ConfigLine> {
    let entries: Vec<(&'static str, String, &'static str)> = vec![
        ("database.url", config.database.url.clone(), "LEAVEDESK_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "LEAVEDESK_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "LEAVEDESK_DATABASE_TIMEOUT_SECS",
        ),
        ("llm.provider", format!("{:?}", config.llm.provider), "LEAVEDESK_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "LEAVEDESK_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "LEAVEDESK_LLM_BASE_URL",
        ),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref()), "LEAVEDESK_LLM_API_KEY"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "LEAVEDESK_LLM_MAX_RETRIES"),
        ("calendar.enabled", config.calendar.enabled.to_string(), "LEAVEDESK_CALENDAR_ENABLED"),
        (
            "calendar.webhook_url",
            config.calendar.webhook_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "LEAVEDESK_CALENDAR_WEBHOOK_URL",
        ),
        (
            "calendar.api_key",
            redact_secret(config.calendar.api_key.as_ref()),
            "LEAVEDESK_CALENDAR_API_KEY",
        ),
        (
            "routing.confidence_threshold",
            config.routing.confidence_threshold.to_string(),
            "LEAVEDESK_ROUTING_CONFIDENCE_THRESHOLD",
        ),
        (
            "routing.hr_override_phrases",
            config.routing.hr_override_phrases.join(", "),
            "LEAVEDESK_ROUTING_HR_OVERRIDE_PHRASES",
        ),
        (
            "routing.context_turns",
            config.routing.context_turns.to_string(),
            "LEAVEDESK_ROUTING_CONTEXT_TURNS",
        ),
        ("leave.notice_days", config.leave.notice_days.to_string(), "LEAVEDESK_LEAVE_NOTICE_DAYS"),
        (
            "employee_directory.csv_path",
            config
                .employee_directory
                .csv_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            "LEAVEDESK_EMPLOYEE_DIRECTORY_CSV_PATH",
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            "LEAVEDESK_SERVER_BIND_ADDRESS",
        ),
        ("server.port", config.server.port.to_string(), "LEAVEDESK_SERVER_PORT"),
        ("logging.level", config.logging.level.clone(), "LEAVEDESK_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "LEAVEDESK_LOGGING_FORMAT"),
    ];

    entries
        .into_iter()
        .map(|(key, value, env_key)| ConfigLine {
            key,
            value,
            source: field_source(key, env_key, config_file_doc, config_file_path),
        })
        .collect()
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = Path::new("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
