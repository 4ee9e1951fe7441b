use async_trait::async_trait;
use handl_core::domain::call::{CallId, CallResult, RemoteCallStatus};
use handl_core::domain::task::ExtractedInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub target_number: String,
    pub generated_script: String,
}

/// One status fetch from the call placement service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusReport {
    pub status: RemoteCallStatus,
    pub transcript: Option<String>,
    pub recording_reference: Option<String>,
    pub cost: Option<f64>,
    pub ended_reason: Option<String>,
}

impl CallStatusReport {
    pub fn live(status: RemoteCallStatus) -> Self {
        Self { status, transcript: None, recording_reference: None, cost: None, ended_reason: None }
    }

    pub fn ended(transcript: impl Into<String>) -> Self {
        Self {
            status: RemoteCallStatus::Ended,
            transcript: Some(transcript.into()),
            recording_reference: None,
            cost: None,
            ended_reason: Some("customer-ended-call".to_string()),
        }
    }

    pub fn into_result(self) -> CallResult {
        CallResult {
            transcript: self.transcript,
            recording_reference: self.recording_reference,
            ended_reason: self.ended_reason,
            cost: self.cost,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// The service answered with an explicit error. Never retried.
    #[error("call placement rejected: {0}")]
    Rejected(String),
    /// Network, server-side or decode failure.
    #[error("call placement transport failure: {0}")]
    Transport(String),
}

impl PlacementError {
    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected(reason) | Self::Transport(reason) => reason,
        }
    }
}

#[async_trait]
pub trait CallPlacement: Send + Sync {
    async fn place(&self, request: &CallRequest) -> Result<CallId, PlacementError>;
    async fn status(&self, call_id: &CallId) -> Result<CallStatusReport, PlacementError>;
}

/// Renders the assistant instructions for one outbound call.
pub fn render_call_script(objective: &str, info: &ExtractedInfo) -> String {
    let caller = info.user_name.as_deref().map(str::trim).filter(|name| !name.is_empty());
    let service = info.value_of("service").unwrap_or_else(|| "the requested service".to_string());

    let mut script = format!(
        "You are an AI assistant calling on behalf of {}. Say that you are an AI assistant \
         within the first few seconds and ask about {service}.\n\n# OBJECTIVE\n{}\n",
        caller.unwrap_or("a Handl user"),
        objective.trim()
    );

    if !info.questions_to_ask.is_empty() {
        script.push_str("\n# QUESTIONS TO ASK\n");
        for (position, question) in info.questions_to_ask.iter().enumerate() {
            script.push_str(&format!("{}. {}\n", position + 1, question.trim()));
        }
    }

    script.push_str("\n# CONTEXT\n");
    script.push_str(&format!("- Service needed: {service}\n"));
    script.push_str(&format!(
        "- Specific details: {}\n",
        info.value_of("serviceDetails").unwrap_or_else(|| "Not specified".to_string())
    ));
    for (label, field) in [
        ("Budget constraint", "budget"),
        ("Time constraint", "timeConstraints"),
        ("Callback number", "callbackNumber"),
    ] {
        if let Some(value) = info.value_of(field) {
            script.push_str(&format!("- {label}: {value}\n"));
        }
    }

    script.push_str(
        "\n# BOUNDARIES\nGather pricing, availability and details only. Do not commit to \
         purchases, appointments or share personal information beyond what is listed. \
         Confirm what you heard, thank them, and end the call after goodbyes.\n",
    );
    script
}
