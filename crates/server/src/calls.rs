use async_trait::async_trait;
use handl_agent::telephony::{CallPlacement, CallRequest, CallStatusReport, PlacementError};
use handl_core::config::TelephonyConfig;
use handl_core::domain::call::{CallId, RemoteCallStatus};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

/// Outbound calls through the voice-assistant REST API.
pub struct HttpCallPlacement {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    phone_number_id: String,
}

impl HttpCallPlacement {
    pub fn from_config(client: Client, config: &TelephonyConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            phone_number_id: config.phone_number_id.clone(),
        }
    }

    fn api_key(&self) -> Result<&str, PlacementError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| PlacementError::Rejected("telephony api key is not configured".to_string()))
    }
}

#[async_trait]
impl CallPlacement for HttpCallPlacement {
    async fn place(&self, request: &CallRequest) -> Result<CallId, PlacementError> {
        if request.target_number.trim().is_empty() {
            return Err(PlacementError::Rejected("customer phone number is required".to_string()));
        }
        let api_key = self.api_key()?;

        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(api_key)
            .json(&create_call_body(&self.phone_number_id, request))
            .send()
            .await
            .map_err(|error| PlacementError::Transport(error.to_string()))?;
        let payload = read_payload(response).await?;

        payload
            .get("id")
            .and_then(Value::as_str)
            .map(|id| CallId(id.to_string()))
            .ok_or_else(|| PlacementError::Transport("call creation response has no id".to_string()))
    }

    async fn status(&self, call_id: &CallId) -> Result<CallStatusReport, PlacementError> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(format!("{}/call/{}", self.base_url, call_id))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|error| PlacementError::Transport(error.to_string()))?;
        let payload = read_payload(response).await?;

        Ok(parse_status_report(&payload))
    }
}

async fn read_payload(response: Response) -> Result<Value, PlacementError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(failure_for(status, &detail));
    }

    response.json().await.map_err(|error| PlacementError::Transport(error.to_string()))
}

/// 4xx answers are explicit rejections, except timeouts and rate limits,
/// which are worth another poll. Everything else that fails is transport.
fn failure_for(status: StatusCode, body: &str) -> PlacementError {
    let retryable = matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS);
    if status.is_client_error() && !retryable {
        PlacementError::Rejected(format!("{status}: {}", error_message(body)))
    } else {
        PlacementError::Transport(format!("call service returned {status}"))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Array(messages)) => Some(
                messages.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; "),
            ),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn create_call_body(phone_number_id: &str, request: &CallRequest) -> Value {
    json!({
        "phoneNumberId": phone_number_id,
        "customer": {"number": request.target_number.trim()},
        "assistant": {
            "model": {
                "provider": "openai",
                "model": "gpt-4o",
                "messages": [{"role": "system", "content": request.generated_script}],
            },
        },
    })
}

pub fn parse_status_report(payload: &Value) -> CallStatusReport {
    let text = |pointer: &str| {
        payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|value| !value.trim().is_empty())
    };

    CallStatusReport {
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .map(RemoteCallStatus::parse)
            .unwrap_or(RemoteCallStatus::Unknown),
        transcript: text("/artifact/transcript"),
        recording_reference: text("/artifact/recordingUrl"),
        cost: payload.get("cost").and_then(Value::as_f64),
        ended_reason: text("/endedReason"),
    }
}
