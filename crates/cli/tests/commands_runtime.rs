use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use handl_cli::commands::{config, doctor};
use serde_json::Value;

const READY_ENV: [(&str, &str); 3] = [
    ("HANDL_LLM_API_KEY", "gsk-live-secret"),
    ("HANDL_TELEPHONY_API_KEY", "vapi-live-secret"),
    ("HANDL_TELEPHONY_PHONE_NUMBER_ID", "pn-test"),
];

#[test]
fn config_attributes_sources_and_redacts_keys() {
    with_env(&READY_ENV, || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("handl.toml");
        fs::write(&path, "[server]\nport = 9090\n").expect("write config");

        let result = config::run(Some(&path));
        assert_eq!(result.exit_code, 0);

        let output = &result.output;
        assert!(output.contains("- llm.api_key = gsk-*** (source: env (HANDL_LLM_API_KEY))"));
        assert!(output.contains("- telephony.api_key = vapi-*** (source: env (HANDL_TELEPHONY_API_KEY))"));
        assert!(output.contains(&format!("- server.port = 9090 (source: file ({}))", path.display())));
        assert!(output.contains("- llm.model = llama-3.3-70b-versatile (source: default)"));
        assert!(output.contains("- directory.api_key = <unset> (source: default)"));
        assert!(!output.contains("live-secret"));
    });
}

#[test]
fn config_reports_validation_failure_as_json() {
    with_env(&[("HANDL_LLM_API_KEY", "gsk-test")], || {
        let result = config::run(None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("telephony.phone_number_id")));
    });
}

#[test]
fn doctor_json_passes_with_directory_skipped() {
    with_env(&READY_ENV, || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks");
        assert_eq!(checks.len(), 4);
        assert_eq!(checks[3]["name"], "directory_readiness");
        assert_eq!(checks[3]["status"], "skipped");
    });
}

#[test]
fn doctor_fails_when_config_does_not_load() {
    with_env(&[], || {
        let result = doctor::run(None, false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: 1 readiness check(s) failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] telephony_readiness"));
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
        "HANDL_LLM_PROVIDER",
        "HANDL_LLM_API_KEY",
        "HANDL_LLM_BASE_URL",
        "HANDL_LLM_MODEL",
        "HANDL_LLM_TIMEOUT_SECS",
        "HANDL_LLM_MAX_RETRIES",
        "HANDL_TELEPHONY_API_KEY",
        "HANDL_TELEPHONY_BASE_URL",
        "HANDL_TELEPHONY_PHONE_NUMBER_ID",
        "HANDL_DIRECTORY_API_KEY",
        "HANDL_DIRECTORY_BASE_URL",
        "HANDL_DIRECTORY_DEFAULT_LIMIT",
        "HANDL_SERVER_BIND_ADDRESS",
        "HANDL_SERVER_PORT",
        "HANDL_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HANDL_LOGGING_LEVEL",
        "HANDL_LOGGING_FORMAT",
        "HANDL_LOG_LEVEL",
        "HANDL_LOG_FORMAT",
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
