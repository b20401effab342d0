use std::env;
use std::sync::{Mutex, OnceLock};

use leavedesk_cli::commands::{config, migrate, route, seed};
use serde_json::Value;

const MEMORY_DB: [(&str, &str); 2] =
    [("LEAVEDESK_DATABASE_URL", "sqlite::memory:"), ("LEAVEDESK_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_hosted_model_without_key() {
    let vars =
        [("LEAVEDESK_DATABASE_URL", "sqlite::memory:"), ("LEAVEDESK_LLM_PROVIDER", "openai")];
    with_env(&vars, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_repeatable_and_reports_the_same_summary() {
    with_env(&MEMORY_DB, || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
        assert!(first_payload["message"].as_str().unwrap_or_default().contains("5 users"));
    });
}

#[test]
fn config_lists_effective_values_with_sources() {
    with_env(&[("LEAVEDESK_ROUTING_CONTEXT_TURNS", "4")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let lines = payload["data"].as_array().expect("config lines");
        let turns = lines
            .iter()
            .find(|line| line["key"] == "routing.context_turns")
            .expect("context turns line");
        assert_eq!(turns["value"], "4");
        assert_eq!(turns["source"], "env (LEAVEDESK_ROUTING_CONTEXT_TURNS)");

        let api_key = lines.iter().find(|line| line["key"] == "llm.api_key").expect("api key line");
        assert_eq!(api_key["value"], "<unset>");
    });
}

#[test]
fn route_rejects_unknown_roles_before_touching_storage() {
    with_env(&MEMORY_DB, || {
        let result = route::run("usr-emp-001", Some("ceo"), "hello");
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_role");
    });
}

#[test]
fn route_answers_as_a_seeded_user_even_when_the_model_is_unreachable() {
    let dir = tempfile::tempdir().expect("temp dir");
    let database_url = format!("sqlite://{}?mode=rwc", dir.path().join("leavedesk.db").display());
    let vars = [
        ("LEAVEDESK_DATABASE_URL", database_url.as_str()),
        ("LEAVEDESK_LLM_BASE_URL", "http://127.0.0.1:9"),
        ("LEAVEDESK_LLM_MAX_RETRIES", "0"),
        ("LEAVEDESK_LLM_TIMEOUT_SECS", "1"),
    ];

    with_env(&vars, || {
        assert_eq!(seed::run().exit_code, 0);

        let unknown = route::run("usr-nobody", None, "hello");
        assert_eq!(unknown.exit_code, 6);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_user");

        let result = route::run("usr-emp-003", None, "What are the working hours?");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "route");
        assert_eq!(payload["data"]["category"], "general_hr");
        assert_eq!(payload["data"]["arbitrated"], false);
        assert_eq!(
            payload["message"],
            "Policy on working hours: Standard working hours are 9 AM to 5 PM, Monday through Friday."
        );
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LEAVEDESK_DATABASE_URL",
        "LEAVEDESK_DATABASE_MAX_CONNECTIONS",
        "LEAVEDESK_DATABASE_TIMEOUT_SECS",
        "LEAVEDESK_LLM_PROVIDER",
        "LEAVEDESK_LLM_API_KEY",
        "LEAVEDESK_LLM_BASE_URL",
        "LEAVEDESK_LLM_MODEL",
        "LEAVEDESK_LLM_TIMEOUT_SECS",
        "LEAVEDESK_LLM_MAX_RETRIES",
        "LEAVEDESK_CALENDAR_ENABLED",
        "LEAVEDESK_CALENDAR_WEBHOOK_URL",
        "LEAVEDESK_CALENDAR_API_KEY",
        "LEAVEDESK_CALENDAR_TIMEOUT_SECS",
        "LEAVEDESK_ROUTING_CONFIDENCE_THRESHOLD",
        "LEAVEDESK_ROUTING_HR_OVERRIDE_PHRASES",
        "LEAVEDESK_ROUTING_CONTEXT_TURNS",
        "LEAVEDESK_LEAVE_NOTICE_DAYS",
        "LEAVEDESK_EMPLOYEE_DIRECTORY_CSV_PATH",
        "LEAVEDESK_SERVER_BIND_ADDRESS",
        "LEAVEDESK_SERVER_PORT",
        "LEAVEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LEAVEDESK_LOGGING_LEVEL",
        "LEAVEDESK_LOGGING_FORMAT",
        "LEAVEDESK_LOG_LEVEL",
        "LEAVEDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
