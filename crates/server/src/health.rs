use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use handl_core::config::AppConfig;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm: HealthCheck,
    pub telephony: HealthCheck,
    pub directory: HealthCheck,
    pub checked_at: String,
}

/// Collaborator readiness derived once from configuration.
#[derive(Clone, Debug)]
pub struct HealthState {
    llm: HealthCheck,
    telephony: HealthCheck,
    directory: HealthCheck,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        let has_secret = |secret: Option<&secrecy::SecretString>| {
            secret.is_some_and(|value| !value.expose_secret().trim().is_empty())
        };

        let llm = if !config.llm.provider.requires_api_key() || has_secret(config.llm.api_key.as_ref()) {
            ready(format!("{} model {}", config.llm.provider.as_str(), config.llm.model))
        } else {
            degraded(format!("{} api key is missing", config.llm.provider.as_str()))
        };

        let telephony = if !has_secret(config.telephony.api_key.as_ref()) {
            degraded("telephony api key is missing".to_string())
        } else if config.telephony.phone_number_id.trim().is_empty() {
            degraded("telephony phone number id is missing".to_string())
        } else {
            ready(format!("calls placed from {}", config.telephony.phone_number_id))
        };

        let directory = if has_secret(config.directory.api_key.as_ref()) {
            ready(format!("search limit {}", config.directory.default_limit))
        } else {
            HealthCheck {
                status: "disabled",
                detail: "directory api key is not set; manual numbers only".to_string(),
            }
        };

        Self { llm, telephony, directory }
    }
}

fn ready(detail: String) -> HealthCheck {
    HealthCheck { status: "ready", detail }
}

fn degraded(detail: String) -> HealthCheck {
    HealthCheck { status: "degraded", detail }
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.llm.status == "ready" && state.telephony.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "handl-server runtime initialized".to_string(),
        },
        llm: state.llm,
        telephony: state.telephony,
        directory: state.directory,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use handl_core::config::{AppConfig, LlmProvider};

    use crate::health::{health, HealthState};

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("gsk-test".to_string().into());
        config.telephony.api_key = Some("vapi-test".to_string().into());
        config.telephony.phone_number_id = "pn-1".to_string();
        config
    }

    #[tokio::test]
    async fn health_is_ready_when_llm_and_telephony_are_configured() {
        let (status, Json(payload)) = health(State(HealthState::from_config(&configured()))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.llm.status, "ready");
        assert_eq!(payload.directory.status, "disabled");
    }

    #[tokio::test]
    async fn health_degrades_without_telephony_credentials() {
        let mut config = configured();
        config.telephony.api_key = None;

        let (status, Json(payload)) = health(State(HealthState::from_config(&config))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.telephony.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn local_model_needs_no_api_key() {
        let mut config = configured();
        config.llm.provider = LlmProvider::Ollama;
        config.llm.api_key = None;
        config.llm.base_url = Some("http://localhost:11434/v1".to_string());

        let (_, Json(payload)) = health(State(HealthState::from_config(&config))).await;
        assert_eq!(payload.llm.status, "ready");
    }
}
