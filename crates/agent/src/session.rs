//! One user's task: the conversation, its descriptor and the call sequence.
//!
//! Conversation turns are analyzed against the full history; only task updates
//! change the descriptor. Call dispatch is split in two: `prepare_calls` and
//! `submit_answers` validate and schedule synchronously, and `run_pending`
//! performs the dials so a caller can run it in the background.

use std::sync::Arc;

use handl_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use handl_core::domain::session::SessionId;
use handl_core::domain::task::{CallType, InfoRequest, ResponseKind, TaskDescriptor};
use handl_core::errors::{ApplicationError, DomainError};
use handl_core::flows::SequenceState;
use handl_core::queue::{
    order_for_display, DirectoryListing, ManualTarget, QueueError, SearchSelection,
    TargetQueueBuilder,
};
use handl_core::readiness::{AnswerError, FieldAnswer, MissingInfoResolver, ReadinessGap};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::conversation::{AnalyzerError, ConversationAnalyzer};
use crate::directory::{query_for, DirectoryError, DirectorySearch};
use crate::guardrails::{GuardrailDecision, SessionIntent, SessionPolicy};
use crate::llm::ChatMessage;
use crate::runtime::Collaborators;
use crate::sequencer::{CallSequencer, SequenceError, SequenceSnapshot};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{user_message}")]
    Denied { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Answers(#[from] AnswerError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("task is not ready to call: {0:?}")]
    NotReady(Vec<ReadinessGap>),
    #[error("the task has no service to search for")]
    NothingToSearch,
    #[error("no calls are waiting to be dispatched")]
    NothingPending,
}

impl From<SessionError> for ApplicationError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Denied { user_message, .. } => Self::Conflict(user_message),
            SessionError::Analyzer(error) if error.is_contract_failure() => {
                Self::CollaboratorContract(error.to_string())
            }
            SessionError::Analyzer(error) => Self::Integration(error.to_string()),
            SessionError::Directory(error) => Self::Integration(error.to_string()),
            SessionError::Sequence(SequenceError::Flow(error)) => {
                Self::Domain(DomainError::FlowTransition(error))
            }
            SessionError::Sequence(SequenceError::Domain(error)) => Self::Domain(error),
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

/// Result of one analyzed user turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub response_kind: ResponseKind,
    pub reply: Option<String>,
    pub descriptor: TaskDescriptor,
    pub call_ready: bool,
    pub pending_requests: Vec<InfoRequest>,
    pub gaps: Vec<ReadinessGap>,
    /// The previous, finished task was cleared before this turn.
    pub reset: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Answers went through the analyzer as a user turn.
    Turn(TurnOutcome),
    /// Answers unblocked a paused sequence; `run_pending` re-dials `index`.
    ResumeScheduled { index: usize },
}

/// Which targets to call: manual numbers first, then the selected listings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallPlan {
    pub manual: Vec<ManualTarget>,
    pub selected: Vec<DirectoryListing>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub descriptor: TaskDescriptor,
    pub call_ready: bool,
    pub sequence: SequenceSnapshot,
}

pub struct Session {
    id: SessionId,
    history: Vec<ChatMessage>,
    descriptor: TaskDescriptor,
    sequencer: CallSequencer,
    policy: SessionPolicy,
    analyzer: Arc<dyn ConversationAnalyzer>,
    directory: Arc<dyn DirectorySearch>,
    audit: Arc<dyn AuditSink>,
    audit_context: AuditContext,
    search_limit: usize,
    pending_dispatch: Option<usize>,
    descriptors: watch::Sender<TaskDescriptor>,
}

impl Session {
    pub fn new(
        id: SessionId,
        collaborators: &Collaborators,
        policy: SessionPolicy,
        audit: Arc<dyn AuditSink>,
        search_limit: usize,
    ) -> Self {
        let audit_context = AuditContext::new(Some(id.0.clone()), id.0.clone(), "session");
        let sequencer = CallSequencer::new(
            collaborators.placement.clone(),
            collaborators.extractor.clone(),
            audit.clone(),
            audit_context.with_actor("call-sequencer"),
        );
        let (descriptors, _) = watch::channel(TaskDescriptor::default());

        Self {
            id,
            history: Vec::new(),
            descriptor: TaskDescriptor::default(),
            sequencer,
            policy,
            analyzer: collaborators.analyzer.clone(),
            directory: collaborators.directory.clone(),
            audit,
            audit_context,
            search_limit,
            pending_dispatch: None,
            descriptors,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn sequence_state(&self) -> SequenceState {
        self.sequencer.state()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            descriptor: self.descriptor.clone(),
            call_ready: self.descriptor.is_call_ready(),
            sequence: self.sequencer.snapshot(),
        }
    }

    pub fn subscribe_descriptor(&self) -> watch::Receiver<TaskDescriptor> {
        self.descriptors.subscribe()
    }

    pub fn subscribe_sequence(&self) -> watch::Receiver<SequenceSnapshot> {
        self.sequencer.subscribe()
    }

    /// Analyzes one user message against the whole conversation.
    ///
    /// A failed analysis leaves both the history and the descriptor as they were.
    pub async fn handle_message(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let restart = matches!(
            self.check(SessionIntent::NewTaskMessage)?,
            GuardrailDecision::Degrade { .. }
        );

        // After a finished sequence the message is analyzed on its own, and the
        // finished task is only cleared once the reply is a task update.
        let user_turn = ChatMessage::user(text);
        let result = if restart {
            self.analyzer.analyze(std::slice::from_ref(&user_turn)).await
        } else {
            self.history.push(user_turn.clone());
            let result = self.analyzer.analyze(&self.history).await;
            if result.is_err() {
                self.history.pop();
            }
            result
        };
        let analysis = match result {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(
                    event_name = "conversation.analysis_failed",
                    session_id = %self.id,
                    error = %error,
                    "conversation analysis failed"
                );
                self.emit("conversation.turn_analyzed", AuditCategory::Conversation, AuditOutcome::Failed);
                return Err(error.into());
            }
        };

        let reset = restart && analysis.response_kind == ResponseKind::TaskUpdate;
        if reset {
            self.reset()?;
        }
        if restart {
            self.history.push(user_turn);
        }
        analysis.apply_to(&mut self.descriptor);
        self.history.push(ChatMessage::assistant(analysis.raw.clone()));
        self.descriptors.send_replace(self.descriptor.clone());

        let call_ready = self.descriptor.is_call_ready();
        info!(
            event_name = "conversation.turn_analyzed",
            session_id = %self.id,
            response_kind = ?analysis.response_kind,
            call_ready,
            "conversation turn analyzed"
        );
        self.emit("conversation.turn_analyzed", AuditCategory::Conversation, AuditOutcome::Success);

        Ok(TurnOutcome {
            response_kind: analysis.response_kind,
            reply: analysis.reply,
            descriptor: self.descriptor.clone(),
            call_ready,
            pending_requests: MissingInfoResolver::pending_requests(&self.descriptor)
                .into_iter()
                .cloned()
                .collect(),
            gaps: MissingInfoResolver::gaps(&self.descriptor),
            reset,
        })
    }

    /// Answers to the clarification form, or to questions raised by a call.
    pub async fn submit_answers(
        &mut self,
        answers: &[FieldAnswer],
    ) -> Result<AnswerOutcome, SessionError> {
        self.check(SessionIntent::SubmitAnswers)?;

        if self.sequencer.state() != SequenceState::Paused {
            let requests = MissingInfoResolver::pending_requests(&self.descriptor)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>();
            let message = MissingInfoResolver::fold_answers(&requests, answers)?;
            return Ok(AnswerOutcome::Turn(self.handle_message(&message).await?));
        }

        let lines = MissingInfoResolver::answered_lines(self.sequencer.pending_questions(), answers)?;
        let mut descriptor = self.descriptor.clone();
        descriptor.append_service_details(&lines.join("\n"));
        let index = self.sequencer.resume(&descriptor)?;

        self.descriptor = descriptor;
        self.descriptors.send_replace(self.descriptor.clone());
        self.pending_dispatch = Some(index);
        info!(
            event_name = "sequence.resume_scheduled",
            session_id = %self.id,
            index,
            "answers recorded; re-dialing paused target"
        );
        Ok(AnswerOutcome::ResumeScheduled { index })
    }

    /// Looks up businesses for the task. Dialable listings come first, preselected.
    pub async fn search(&mut self) -> Result<SearchSelection, SessionError> {
        let query = query_for(&self.descriptor, self.search_limit)
            .ok_or(SessionError::NothingToSearch)?;
        let listings = self.directory.search(&query).await?;
        let selection =
            SearchSelection::preselected(order_for_display(listings, query.preferred_criteria));

        info!(
            event_name = "directory.search_completed",
            session_id = %self.id,
            query = %query.search_text(),
            results = selection.listings.len(),
            "directory search completed"
        );
        Ok(selection)
    }

    /// Builds the queue and confirms it. Dialing happens in [`Session::run_pending`].
    pub fn prepare_calls(&mut self, plan: &CallPlan) -> Result<usize, SessionError> {
        self.check(SessionIntent::StartCalls)?;

        let gaps = MissingInfoResolver::gaps(&self.descriptor);
        if !gaps.is_empty() {
            return Err(SessionError::NotReady(gaps));
        }

        let mut manual = plan.manual.clone();
        let info = &self.descriptor.extracted_info;
        if manual.is_empty() && self.descriptor.call_type == Some(CallType::CallSpecificNumber) {
            if let Some(phone_number) = info.value_of("phoneNumber") {
                manual.push(ManualTarget { name: info.value_of("businessName"), phone_number });
            }
        }

        let targets =
            TargetQueueBuilder::new().add_manual(&manual)?.add_listings(&plan.selected).build()?;
        let queue_len = targets.len();

        let index = self.sequencer.begin(targets, &self.descriptor)?;
        self.pending_dispatch = Some(index);
        info!(
            event_name = "sequence.started",
            session_id = %self.id,
            targets = queue_len,
            "call queue confirmed"
        );
        Ok(index)
    }

    /// Dials whatever `prepare_calls` or `submit_answers` scheduled.
    pub async fn run_pending(&mut self) -> Result<SequenceState, SessionError> {
        let index = self.pending_dispatch.take().ok_or(SessionError::NothingPending)?;
        Ok(self.sequencer.drive(&self.descriptor, index).await?)
    }

    pub async fn start_calls(&mut self, plan: &CallPlan) -> Result<SequenceState, SessionError> {
        self.prepare_calls(plan)?;
        self.run_pending().await
    }

    pub fn abandon_sequence(&mut self) -> Result<(), SessionError> {
        self.check(SessionIntent::AbandonSequence)?;
        self.sequencer.abandon()?;
        self.pending_dispatch = None;
        info!(event_name = "sequence.abandoned", session_id = %self.id, "call sequence abandoned");
        Ok(())
    }

    fn check(&self, intent: SessionIntent) -> Result<GuardrailDecision, SessionError> {
        let state = self.sequencer.state();
        match self.policy.evaluate(intent, state) {
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                warn!(
                    event_name = "session.guardrail_denied",
                    session_id = %self.id,
                    action = intent.action_key(),
                    state = state.as_str(),
                    reason_code,
                    "session operation denied"
                );
                self.audit.emit(
                    AuditEvent::new(
                        &self.audit_context,
                        "session.guardrail_denied",
                        AuditCategory::Sequence,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", intent.action_key())
                    .with_metadata("reason_code", reason_code),
                );
                Err(SessionError::Denied { reason_code, user_message, fallback_path })
            }
            decision => Ok(decision),
        }
    }

    /// Drops a finished task so the next message starts from scratch.
    fn reset(&mut self) -> Result<(), SessionError> {
        self.sequencer.abandon()?;
        self.history.clear();
        self.descriptor = TaskDescriptor::default();
        self.pending_dispatch = None;
        self.descriptors.send_replace(self.descriptor.clone());
        info!(event_name = "session.reset", session_id = %self.id, "finished task cleared");
        Ok(())
    }

    fn emit(&self, event_type: &str, category: AuditCategory, outcome: AuditOutcome) {
        self.audit.emit(AuditEvent::new(&self.audit_context, event_type, category, outcome));
    }
}
