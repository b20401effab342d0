use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::leave::LeaveKind;
use crate::policy::{Allotment, LeavePolicy};

pub const DEFAULT_CONFIG_FILE: &str = "leavedesk.toml";
pub const ENV_PREFIX: &str = "LEAVEDESK_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub calendar: CalendarConfig,
    pub routing: RoutingConfig,
    pub leave: LeaveConfig,
    pub employee_directory: EmployeeDirectoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    /// Primary answers below this confidence go through arbitration.
    pub confidence_threshold: f64,
    pub hr_override_phrases: Vec<String>,
    pub context_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LeaveConfig {
    pub allotments: BTreeMap<LeaveKind, Allotment>,
    pub notice_days: i64,
    pub disambiguation_limit: usize,
    pub list_limit: usize,
    pub pending_preview: usize,
    pub upcoming_window_days: i64,
}

impl LeaveConfig {
    pub fn policy(&self) -> LeavePolicy {
        LeavePolicy::new(self.allotments.clone(), self.notice_days)
    }
}

#[derive(Clone, Debug, Default)]
pub struct EmployeeDirectoryConfig {
    pub csv_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub calendar_enabled: Option<bool>,
    pub employee_directory_csv: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = LeavePolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://leavedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            calendar: CalendarConfig {
                enabled: false,
                webhook_url: None,
                api_key: None,
                timeout_secs: 10,
            },
            routing: RoutingConfig {
                confidence_threshold: 0.6,
                hr_override_phrases: vec![
                    "force leave".to_string(),
                    "override".to_string(),
                    "admin action".to_string(),
                ],
                context_turns: 10,
            },
            leave: LeaveConfig {
                allotments: LeaveKind::ALL
                    .into_iter()
                    .map(|kind| (kind, policy.allotment(kind)))
                    .collect(),
                notice_days: policy.notice_days(),
                disambiguation_limit: 5,
                list_limit: 10,
                pending_preview: 3,
                upcoming_window_days: 30,
            },
            employee_directory: EmployeeDirectoryConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(enabled) = calendar.enabled {
                self.calendar.enabled = enabled;
            }
            if let Some(webhook_url) = calendar.webhook_url {
                self.calendar.webhook_url = Some(webhook_url);
            }
            if let Some(api_key) = calendar.api_key {
                self.calendar.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(threshold) = routing.confidence_threshold {
                self.routing.confidence_threshold = threshold;
            }
            if let Some(phrases) = routing.hr_override_phrases {
                self.routing.hr_override_phrases = phrases;
            }
            if let Some(context_turns) = routing.context_turns {
                self.routing.context_turns = context_turns;
            }
        }

        if let Some(leave) = patch.leave {
            if let Some(allotments) = leave.allotments {
                for (key, setting) in allotments {
                    let kind = key.parse::<LeaveKind>().map_err(|_| {
                        ConfigError::Validation(format!(
                            "leave.allotments has unknown leave type `{key}`"
                        ))
                    })?;
                    self.leave.allotments.insert(kind, setting.into_allotment(&key)?);
                }
            }
            if let Some(notice_days) = leave.notice_days {
                self.leave.notice_days = notice_days;
            }
            if let Some(limit) = leave.disambiguation_limit {
                self.leave.disambiguation_limit = limit;
            }
            if let Some(limit) = leave.list_limit {
                self.leave.list_limit = limit;
            }
            if let Some(preview) = leave.pending_preview {
                self.leave.pending_preview = preview;
            }
            if let Some(days) = leave.upcoming_window_days {
                self.leave.upcoming_window_days = days;
            }
        }

        if let Some(directory) = patch.employee_directory {
            if let Some(csv_path) = directory.csv_path {
                self.employee_directory.csv_path = Some(csv_path);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEAVEDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("LEAVEDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEAVEDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("LEAVEDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEAVEDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEAVEDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEAVEDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEAVEDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LEAVEDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEAVEDESK_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("LEAVEDESK_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("LEAVEDESK_CALENDAR_ENABLED") {
            self.calendar.enabled = parse_env("LEAVEDESK_CALENDAR_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEAVEDESK_CALENDAR_WEBHOOK_URL") {
            self.calendar.webhook_url = Some(value);
        }
        if let Some(value) = read_env("LEAVEDESK_CALENDAR_API_KEY") {
            self.calendar.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEAVEDESK_CALENDAR_TIMEOUT_SECS") {
            self.calendar.timeout_secs = parse_env("LEAVEDESK_CALENDAR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEDESK_ROUTING_CONFIDENCE_THRESHOLD") {
            self.routing.confidence_threshold =
                parse_env("LEAVEDESK_ROUTING_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("LEAVEDESK_ROUTING_HR_OVERRIDE_PHRASES") {
            self.routing.hr_override_phrases = value
                .split(',')
                .map(str::trim)
                .filter(|phrase| !phrase.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("LEAVEDESK_ROUTING_CONTEXT_TURNS") {
            self.routing.context_turns = parse_env("LEAVEDESK_ROUTING_CONTEXT_TURNS", &value)?;
        }

        if let Some(value) = read_env("LEAVEDESK_LEAVE_NOTICE_DAYS") {
            self.leave.notice_days = parse_env("LEAVEDESK_LEAVE_NOTICE_DAYS", &value)?;
        }

        if let Some(value) = read_env("LEAVEDESK_EMPLOYEE_DIRECTORY_CSV_PATH") {
            self.employee_directory.csv_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("LEAVEDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEAVEDESK_SERVER_PORT") {
            self.server.port = parse_env("LEAVEDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEAVEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("LEAVEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("LEAVEDESK_LOGGING_LEVEL").or_else(|| read_env("LEAVEDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEAVEDESK_LOGGING_FORMAT").or_else(|| read_env("LEAVEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.calendar_enabled {
            self.calendar.enabled = enabled;
        }
        if let Some(csv_path) = overrides.employee_directory_csv {
            self.employee_directory.csv_path = Some(csv_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_calendar(&self.calendar)?;
        validate_routing(&self.routing)?;
        validate_leave(&self.leave)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Path of the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers (set LEAVEDESK_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if !calendar.enabled {
        return Ok(());
    }

    match calendar.webhook_url.as_deref().map(str::trim) {
        None | Some("") => Err(ConfigError::Validation(
            "calendar.enabled is true but calendar.webhook_url is not set".to_string(),
        )),
        Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
            Err(ConfigError::Validation(
                "calendar.webhook_url must start with http:// or https://".to_string(),
            ))
        }
        Some(_) if calendar.timeout_secs == 0 || calendar.timeout_secs > 120 => Err(
            ConfigError::Validation("calendar.timeout_secs must be in range 1..=120".to_string()),
        ),
        Some(_) => Ok(()),
    }
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&routing.confidence_threshold) {
        return Err(ConfigError::Validation(
            "routing.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if routing.hr_override_phrases.iter().any(|phrase| phrase.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "routing.hr_override_phrases must not contain blank phrases".to_string(),
        ));
    }

    Ok(())
}

fn validate_leave(leave: &LeaveConfig) -> Result<(), ConfigError> {
    for (kind, allotment) in &leave.allotments {
        if let Allotment::Days(days) = allotment {
            if !days.is_finite() || *days < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "leave.allotments.{kind} must be a non-negative number of days"
                )));
            }
        }
    }

    if leave.notice_days < 0 {
        return Err(ConfigError::Validation("leave.notice_days must not be negative".to_string()));
    }

    if leave.disambiguation_limit == 0 || leave.list_limit == 0 {
        return Err(ConfigError::Validation(
            "leave.disambiguation_limit and leave.list_limit must be greater than zero"
                .to_string(),
        ));
    }

    if leave.upcoming_window_days <= 0 {
        return Err(ConfigError::Validation(
            "leave.upcoming_window_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    calendar: Option<CalendarPatch>,
    routing: Option<RoutingPatch>,
    leave: Option<LeavePatch>,
    employee_directory: Option<EmployeeDirectoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    enabled: Option<bool>,
    webhook_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    confidence_threshold: Option<f64>,
    hr_override_phrases: Option<Vec<String>>,
    context_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LeavePatch {
    allotments: Option<BTreeMap<String, AllotmentSetting>>,
    notice_days: Option<i64>,
    disambiguation_limit: Option<usize>,
    list_limit: Option<usize>,
    pending_preview: Option<usize>,
    upcoming_window_days: Option<i64>,
}

/// `annual = 20` or `unpaid = "unlimited"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllotmentSetting {
    Days(f64),
    Keyword(String),
}

impl AllotmentSetting {
    fn into_allotment(self, key: &str) -> Result<Allotment, ConfigError> {
        match self {
            Self::Days(days) => Ok(Allotment::Days(days)),
            Self::Keyword(word) if word.trim().eq_ignore_ascii_case("unlimited") => {
                Ok(Allotment::Unlimited)
            }
            Self::Keyword(word) => Err(ConfigError::Validation(format!(
                "leave.allotments.{key} must be a number or \"unlimited\", got `{word}`"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EmployeeDirectoryPatch {
    csv_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
