use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    SerialCalls,
}

/// Sequence-level state. Per-target state lives on each `CallRecord`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    #[default]
    NotStarted,
    Running,
    Paused,
    Finished,
}

impl SequenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_started" => Some(Self::NotStarted),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Running and Paused sequences own the session's task.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceEvent {
    QueueConfirmed,
    /// The current target completed (with or without insight) or failed.
    CallSettled,
    AnswersSubmitted,
    Abandoned,
    /// Dialing stopped on an internal error; nothing is in flight any more.
    Halted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceContext {
    pub current_index: usize,
    pub queue_len: usize,
    pub has_new_questions: bool,
}

impl SequenceContext {
    pub fn new(current_index: usize, queue_len: usize) -> Self {
        Self { current_index, queue_len, has_new_questions: false }
    }

    pub fn with_new_questions(mut self, has_new_questions: bool) -> Self {
        self.has_new_questions = has_new_questions;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SequenceAction {
    Dispatch { index: usize },
    SurfaceQuestions { index: usize },
    Finish,
    DiscardNegotiationContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SequenceState,
    pub to: SequenceState,
    pub event: SequenceEvent,
    pub actions: Vec<SequenceAction>,
}

impl TransitionOutcome {
    pub fn dispatch_index(&self) -> Option<usize> {
        self.actions.iter().find_map(|action| match action {
            SequenceAction::Dispatch { index } => Some(*index),
            _ => None,
        })
    }
}
