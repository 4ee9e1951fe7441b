use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::target::CallTarget;
use crate::domain::task::InfoRequest;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-target lifecycle owned by the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Idle,
    Dialing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dialing => "dialing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "dialing" => Some(Self::Dialing),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Dialing | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Status string reported by the call placement service while polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteCallStatus {
    Queued,
    Ringing,
    InProgress,
    Forwarding,
    Ended,
    Unknown,
}

impl RemoteCallStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "queued" | "scheduled" => Self::Queued,
            "ringing" => Self::Ringing,
            "in-progress" => Self::InProgress,
            "forwarding" => Self::Forwarding,
            "ended" => Self::Ended,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub transcript: Option<String>,
    pub recording_reference: Option<String>,
    pub ended_reason: Option<String>,
    pub cost: Option<f64>,
}

impl CallResult {
    pub fn transcript_text(&self) -> Option<&str> {
        self.transcript.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }
}

/// Structured findings extracted from a completed call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInsight {
    pub summary: String,
    pub price: Option<String>,
    pub has_new_questions: bool,
    pub new_questions: Vec<InfoRequest>,
    pub negotiation_notes: Option<String>,
}

impl CallInsight {
    /// Questions are only surfaced when the flag is set and at least one exists.
    pub fn pending_questions(&self) -> Option<&[InfoRequest]> {
        (self.has_new_questions && !self.new_questions.is_empty())
            .then_some(self.new_questions.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub target: CallTarget,
    pub status: CallStatus,
    pub call_id: Option<CallId>,
    pub live_status: Option<RemoteCallStatus>,
    pub result: Option<CallResult>,
    pub insight: Option<CallInsight>,
    pub failure_reason: Option<String>,
    /// Set when the call completed but its transcript could not be analyzed.
    #[serde(default)]
    pub insight_error: Option<String>,
    pub dial_count: u32,
}

impl CallRecord {
    pub fn new(target: CallTarget) -> Self {
        Self {
            target,
            status: CallStatus::Idle,
            call_id: None,
            live_status: None,
            result: None,
            insight: None,
            failure_reason: None,
            insight_error: None,
            dial_count: 0,
        }
    }

    /// Idle or settled -> Dialing. A re-dial clears the previous attempt.
    pub fn begin_dial(&mut self) -> Result<(), DomainError> {
        self.ensure(
            matches!(self.status, CallStatus::Idle | CallStatus::Completed | CallStatus::Failed),
            CallStatus::Dialing,
        )?;
        self.status = CallStatus::Dialing;
        self.call_id = None;
        self.live_status = None;
        self.result = None;
        self.insight = None;
        self.failure_reason = None;
        self.insight_error = None;
        self.dial_count += 1;
        Ok(())
    }

    pub fn mark_in_progress(&mut self, call_id: CallId) -> Result<(), DomainError> {
        self.ensure(self.status == CallStatus::Dialing, CallStatus::InProgress)?;
        self.status = CallStatus::InProgress;
        self.call_id = Some(call_id);
        Ok(())
    }

    /// Non-terminal polls only touch the UI-facing status.
    pub fn observe(&mut self, status: RemoteCallStatus) {
        if self.status == CallStatus::InProgress {
            self.live_status = Some(status);
        }
    }

    pub fn complete(&mut self, result: CallResult) -> Result<(), DomainError> {
        self.ensure(self.status == CallStatus::InProgress, CallStatus::Completed)?;
        self.status = CallStatus::Completed;
        self.live_status = Some(RemoteCallStatus::Ended);
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.ensure(self.status.is_active(), CallStatus::Failed)?;
        self.status = CallStatus::Failed;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn attach_insight(&mut self, insight: CallInsight) -> Result<(), DomainError> {
        if self.status != CallStatus::Completed {
            return Err(DomainError::InvariantViolation(format!(
                "insight can only be attached to a completed call, record is {}",
                self.status.as_str()
            )));
        }
        self.insight = Some(insight);
        Ok(())
    }

    pub fn record_insight_error(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        if self.status != CallStatus::Completed {
            return Err(DomainError::InvariantViolation(format!(
                "insight errors belong to a completed call, record is {}",
                self.status.as_str()
            )));
        }
        self.insight_error = Some(error.into());
        Ok(())
    }

    fn ensure(&self, allowed: bool, to: CallStatus) -> Result<(), DomainError> {
        if allowed {
            Ok(())
        } else {
            Err(DomainError::InvalidCallTransition { from: self.status, to })
        }
    }
}
