use handl_core::flows::SequenceState;

/// What the user is trying to do to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionIntent {
    NewTaskMessage,
    SubmitAnswers,
    StartCalls,
    AbandonSequence,
}

impl SessionIntent {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::NewTaskMessage => "session.new_message",
            Self::SubmitAnswers => "session.submit_answers",
            Self::StartCalls => "session.start_calls",
            Self::AbandonSequence => "session.abandon_sequence",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }
}

/// Which session operations are allowed in each sequence state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    /// A message after the sequence finished starts a fresh task instead of failing.
    pub restart_after_finish: bool,
    pub calls_enabled: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self { restart_after_finish: true, calls_enabled: true }
    }
}

impl SessionPolicy {
    pub fn evaluate(&self, intent: SessionIntent, state: SequenceState) -> GuardrailDecision {
        use SequenceState::{Finished, NotStarted, Paused, Running};

        match (intent, state) {
            (SessionIntent::NewTaskMessage, NotStarted) => GuardrailDecision::Allow,
            (SessionIntent::NewTaskMessage, Running | Paused) => in_progress(),
            (SessionIntent::NewTaskMessage, Finished) if self.restart_after_finish => {
                GuardrailDecision::Degrade {
                    reason_code: "sequence_finished",
                    user_message: "Starting a new task. Results from the previous calls were cleared."
                        .to_string(),
                    fallback_path: "reset_session",
                }
            }
            (SessionIntent::NewTaskMessage, Finished) => GuardrailDecision::Deny {
                reason_code: "sequence_finished",
                user_message: "This task is finished. Abandon it to start a new one.".to_string(),
                fallback_path: "abandon_sequence",
            },

            (SessionIntent::SubmitAnswers, Running) => running(),
            (SessionIntent::SubmitAnswers, _) => GuardrailDecision::Allow,

            (SessionIntent::StartCalls, _) if !self.calls_enabled => GuardrailDecision::Deny {
                reason_code: "calls_disabled",
                user_message: "Outbound calls are disabled for this deployment.".to_string(),
                fallback_path: "review_targets_only",
            },
            (SessionIntent::StartCalls, NotStarted) => GuardrailDecision::Allow,
            (SessionIntent::StartCalls, Running | Paused) => in_progress(),
            (SessionIntent::StartCalls, Finished) => GuardrailDecision::Deny {
                reason_code: "sequence_finished",
                user_message: "These calls already ran. Abandon the sequence to call again."
                    .to_string(),
                fallback_path: "abandon_sequence",
            },

            (SessionIntent::AbandonSequence, Paused | Finished) => GuardrailDecision::Allow,
            (SessionIntent::AbandonSequence, Running) => running(),
            (SessionIntent::AbandonSequence, NotStarted) => GuardrailDecision::Deny {
                reason_code: "no_sequence",
                user_message: "There is no call sequence to abandon.".to_string(),
                fallback_path: "start_calls",
            },
        }
    }
}

fn in_progress() -> GuardrailDecision {
    GuardrailDecision::Deny {
        reason_code: "sequence_in_progress",
        user_message: "A call sequence is in progress. Answer its questions or abandon it first."
            .to_string(),
        fallback_path: "abandon_sequence",
    }
}

fn running() -> GuardrailDecision {
    GuardrailDecision::Deny {
        reason_code: "sequence_running",
        user_message: "A call is underway. Wait for it to finish.".to_string(),
        fallback_path: "wait_for_call",
    }
}
