use std::env;
use std::fs;
use std::path::Path;

use handl_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use super::{CommandResult, EXIT_CONFIG_INVALID};

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let options =
        LoadOptions { config_path: config_path.map(Path::to_path_buf), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_INVALID,
            );
        }
    };

    let file_path = resolve_config_path(config_path);
    CommandResult::text(0, render(&config, file_path.as_deref()))
}

pub fn render(config: &AppConfig, file_path: Option<&Path>) -> String {
    let file_doc = load_config_file_doc(file_path);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(field.key, field.env_key, file_doc.as_ref(), file_path);
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key: &'static str, env_key: &'static str, value: String| Field { key, env_key, value };

    vec![
        field("llm.provider", "HANDL_LLM_PROVIDER", config.llm.provider.as_str().to_string()),
        field("llm.model", "HANDL_LLM_MODEL", config.llm.model.clone()),
        field(
            "llm.base_url",
            "HANDL_LLM_BASE_URL",
            config.llm.effective_base_url().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("llm.api_key", "HANDL_LLM_API_KEY", redact_secret(config.llm.api_key.as_ref())),
        field("llm.timeout_secs", "HANDL_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        field("llm.max_retries", "HANDL_LLM_MAX_RETRIES", config.llm.max_retries.to_string()),
        field(
            "telephony.api_key",
            "HANDL_TELEPHONY_API_KEY",
            redact_secret(config.telephony.api_key.as_ref()),
        ),
        field("telephony.base_url", "HANDL_TELEPHONY_BASE_URL", config.telephony.base_url.clone()),
        field(
            "telephony.phone_number_id",
            "HANDL_TELEPHONY_PHONE_NUMBER_ID",
            config.telephony.phone_number_id.clone(),
        ),
        field(
            "directory.api_key",
            "HANDL_DIRECTORY_API_KEY",
            redact_secret(config.directory.api_key.as_ref()),
        ),
        field("directory.base_url", "HANDL_DIRECTORY_BASE_URL", config.directory.base_url.clone()),
        field(
            "directory.default_limit",
            "HANDL_DIRECTORY_DEFAULT_LIMIT",
            config.directory.default_limit.to_string(),
        ),
        field("server.bind_address", "HANDL_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        field("server.port", "HANDL_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            "HANDL_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field("logging.level", "HANDL_LOGGING_LEVEL", config.logging.level.clone()),
        field(
            "logging.format",
            "HANDL_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

/// Keeps a key's vendor prefix (`gsk-`, `sk-`) and hides the rest.
pub fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if !prefix.is_empty() && prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
