use std::sync::Arc;
use std::time::Duration;

use handl_agent::conversation::LlmConversationAnalyzer;
use handl_agent::insight::LlmInsightExtractor;
use handl_agent::llm::LlmClient;
use handl_agent::{AgentRuntime, Collaborators};
use handl_core::audit::{AuditEvent, AuditSink};
use handl_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

use crate::calls::HttpCallPlacement;
use crate::chat::ChatCompletionsClient;
use crate::places::PlacesDirectory;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("language model client setup failed: {0}")]
    LlmClient(String),
}

/// Audit events go to the structured log.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_event = %event.event_type,
            session_id = event.session_id.as_deref().unwrap_or("-"),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event recorded"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let llm: Arc<dyn LlmClient> = Arc::new(
        ChatCompletionsClient::from_config(http.clone(), &config.llm)
            .map_err(|error| BootstrapError::LlmClient(error.to_string()))?,
    );
    let collaborators = Collaborators {
        analyzer: Arc::new(LlmConversationAnalyzer::new(llm.clone())),
        extractor: Arc::new(LlmInsightExtractor::new(llm)),
        placement: Arc::new(HttpCallPlacement::from_config(http.clone(), &config.telephony)),
        directory: Arc::new(PlacesDirectory::from_config(http, &config.directory)),
    };
    info!(
        event_name = "system.bootstrap.collaborators_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        "collaborator clients constructed"
    );

    let agent_runtime = AgentRuntime::new(collaborators)
        .with_audit_sink(Arc::new(TracingAuditSink))
        .with_search_limit(config.directory.default_limit);

    Ok(Application { config, agent_runtime })
}

#[cfg(test)]
mod tests {
    use handl_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_phone_number_id() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("gsk-test".to_string()),
                telephony_phone_number_id: Some("  ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("telephony.phone_number_id"));
    }

    #[tokio::test]
    async fn bootstrap_builds_runtime_from_valid_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Groq),
                llm_api_key: Some("gsk-test".to_string()),
                telephony_phone_number_id: Some("pn-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.config.telephony.phone_number_id, "pn-test");
        let session = app.agent_runtime.new_session();
        assert!(session.history().is_empty());
    }
}
