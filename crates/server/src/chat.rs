use anyhow::{anyhow, Context};
use async_trait::async_trait;
use handl_agent::llm::{ChatMessage, LlmClient};
use handl_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

const TEMPERATURE: f64 = 0.1;

/// OpenAI-compatible chat-completions endpoint (Groq, OpenAI, Ollama).
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl ChatCompletionsClient {
    pub fn from_config(client: Client, config: &LlmConfig) -> anyhow::Result<Self> {
        let base_url = config
            .effective_base_url()
            .ok_or_else(|| anyhow!("llm.base_url is required for provider {}", config.provider.as_str()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, body: &Value) -> Result<String, Attempt> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| Attempt::Retry(anyhow!(error)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let error = anyhow!("chat completion endpoint returned {status}: {detail}");
            return Err(if is_retryable(status) { Attempt::Retry(error) } else { Attempt::Fatal(error) });
        }

        let payload: Value = response
            .json()
            .await
            .context("failed to decode chat completion response")
            .map_err(Attempt::Fatal)?;
        completion_content(&payload)
            .ok_or_else(|| Attempt::Fatal(anyhow!("chat completion response has no content")))
    }
}

enum Attempt {
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let body = request_body(&self.model, messages);

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(Attempt::Retry(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        attempt,
                        error = %error,
                        "retrying chat completion request"
                    );
                }
                Err(Attempt::Retry(error) | Attempt::Fatal(error)) => return Err(error),
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn request_body(model: &str, messages: &[ChatMessage]) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "temperature": TEMPERATURE,
        "response_format": {"type": "json_object"},
    })
}

/// First choice's content. Non-string content is returned as its JSON text.
pub fn completion_content(payload: &Value) -> Option<String> {
    match payload.pointer("/choices/0/message/content")? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
