use std::sync::Arc;

use handl_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use handl_core::domain::call::{CallRecord, CallStatus};
use handl_core::domain::target::CallTarget;
use handl_core::domain::task::{InfoRequest, TaskDescriptor};
use handl_core::errors::DomainError;
use handl_core::flows::{
    FlowEngine, FlowTransitionError, SequenceAction, SequenceContext, SequenceEvent,
    SequenceState, SerialCallFlow, TransitionOutcome,
};
use handl_core::negotiation::{enhanced_objective, NegotiationContext};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::insight::CallInsightExtractor;
use crate::monitor::{CallMonitor, MonitorOutcome};
use crate::telephony::{render_call_script, CallPlacement, CallRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("the task has no call objective")]
    MissingObjective,
}

/// Read-only view of the sequence, published after every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSnapshot {
    pub state: SequenceState,
    pub current_index: usize,
    pub records: Vec<CallRecord>,
    pub negotiation: Option<NegotiationContext>,
    pub pending_questions: Vec<InfoRequest>,
}

/// Dials a target queue one call at a time.
///
/// Insight extraction for target `i` finishes before target `i + 1` is
/// dispatched, so the negotiation context is always current when the next
/// script is rendered. The sequencer is the only writer of that context.
pub struct CallSequencer {
    engine: FlowEngine<SerialCallFlow>,
    placement: Arc<dyn CallPlacement>,
    extractor: Arc<dyn CallInsightExtractor>,
    monitor: CallMonitor,
    audit: Arc<dyn AuditSink>,
    audit_context: AuditContext,
    state: SequenceState,
    current_index: usize,
    records: Vec<CallRecord>,
    negotiation: Option<NegotiationContext>,
    pending_questions: Vec<InfoRequest>,
    snapshots: watch::Sender<SequenceSnapshot>,
}

impl CallSequencer {
    pub fn new(
        placement: Arc<dyn CallPlacement>,
        extractor: Arc<dyn CallInsightExtractor>,
        audit: Arc<dyn AuditSink>,
        audit_context: AuditContext,
    ) -> Self {
        let (snapshots, _) = watch::channel(SequenceSnapshot::default());
        Self {
            engine: FlowEngine::default(),
            monitor: CallMonitor::new(placement.clone()),
            placement,
            extractor,
            audit,
            audit_context,
            state: SequenceState::NotStarted,
            current_index: 0,
            records: Vec::new(),
            negotiation: None,
            pending_questions: Vec::new(),
            snapshots,
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn negotiation(&self) -> Option<&NegotiationContext> {
        self.negotiation.as_ref()
    }

    pub fn pending_questions(&self) -> &[InfoRequest] {
        &self.pending_questions
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            state: self.state,
            current_index: self.current_index,
            records: self.records.clone(),
            negotiation: self.negotiation.clone(),
            pending_questions: self.pending_questions.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SequenceSnapshot> {
        self.snapshots.subscribe()
    }

    /// Confirms the queue. Returns the index to hand to [`CallSequencer::drive`].
    pub fn begin(
        &mut self,
        targets: Vec<CallTarget>,
        descriptor: &TaskDescriptor,
    ) -> Result<usize, SequenceError> {
        descriptor.objective().ok_or(SequenceError::MissingObjective)?;

        let outcome = self
            .transition(SequenceEvent::QueueConfirmed, SequenceContext::new(0, targets.len()))?;
        self.records = targets.into_iter().map(CallRecord::new).collect();
        self.current_index = 0;
        self.negotiation = None;
        self.pending_questions.clear();
        self.publish();

        dispatch_index(&outcome)
    }

    /// Paused -> Running. The returned index is the paused target, re-dialed.
    pub fn resume(&mut self, descriptor: &TaskDescriptor) -> Result<usize, SequenceError> {
        descriptor.objective().ok_or(SequenceError::MissingObjective)?;

        let outcome = self.transition(
            SequenceEvent::AnswersSubmitted,
            SequenceContext::new(self.current_index, self.records.len()),
        )?;
        self.pending_questions.clear();
        self.publish();

        dispatch_index(&outcome)
    }

    /// Drops a paused or finished sequence along with its negotiation context.
    pub fn abandon(&mut self) -> Result<(), SequenceError> {
        let outcome = self.transition(
            SequenceEvent::Abandoned,
            SequenceContext::new(self.current_index, self.records.len()),
        )?;
        if outcome.actions.contains(&SequenceAction::DiscardNegotiationContext) {
            self.negotiation = None;
        }
        self.records.clear();
        self.current_index = 0;
        self.pending_questions.clear();
        self.publish();
        Ok(())
    }

    /// Dials from `index` until the sequence pauses or finishes.
    ///
    /// An error halts a running sequence as finished, so the session can
    /// abandon it or start a new task.
    pub async fn drive(
        &mut self,
        descriptor: &TaskDescriptor,
        index: usize,
    ) -> Result<SequenceState, SequenceError> {
        let result = self.dial_from(descriptor, index).await;
        if let Err(error) = &result {
            self.halt(error);
        }
        result
    }

    async fn dial_from(
        &mut self,
        descriptor: &TaskDescriptor,
        index: usize,
    ) -> Result<SequenceState, SequenceError> {
        let objective =
            descriptor.objective().ok_or(SequenceError::MissingObjective)?.to_string();

        let mut next = Some(index);
        while let Some(index) = next {
            self.current_index = index;
            let has_new_questions = self.dial(index, &objective, descriptor).await?;

            let outcome = self.transition(
                SequenceEvent::CallSettled,
                SequenceContext::new(index, self.records.len())
                    .with_new_questions(has_new_questions),
            )?;
            for action in &outcome.actions {
                match action {
                    SequenceAction::SurfaceQuestions { index } => {
                        self.pending_questions = self
                            .records
                            .get(*index)
                            .and_then(|record| record.insight.as_ref())
                            .map(|insight| insight.new_questions.clone())
                            .unwrap_or_default();
                        info!(
                            event_name = "sequence.paused",
                            session_id = self.session_label(),
                            correlation_id = %self.audit_context.correlation_id,
                            index = *index,
                            questions = self.pending_questions.len(),
                            "call raised new questions; waiting for answers"
                        );
                    }
                    SequenceAction::Finish => {
                        info!(
                            event_name = "sequence.finished",
                            session_id = self.session_label(),
                            correlation_id = %self.audit_context.correlation_id,
                            targets = self.records.len(),
                            "call sequence finished"
                        );
                    }
                    SequenceAction::Dispatch { .. } | SequenceAction::DiscardNegotiationContext => {}
                }
            }
            next = outcome.dispatch_index();
            self.publish();
        }

        Ok(self.state)
    }

    /// Places, monitors and analyzes one call. Returns whether it raised questions.
    async fn dial(
        &mut self,
        index: usize,
        objective: &str,
        descriptor: &TaskDescriptor,
    ) -> Result<bool, SequenceError> {
        let script = render_call_script(
            &enhanced_objective(objective, self.negotiation.as_ref()),
            &descriptor.extracted_info,
        );
        let record = self.record_mut(index)?;
        record.begin_dial()?;
        let request =
            CallRequest { target_number: record.target.phone_number.clone(), generated_script: script };
        let target = record.target.display_name().to_string();

        let active_calls = self.records.iter().filter(|record| record.status.is_active()).count();
        info!(
            event_name = "sequence.call.dispatched",
            session_id = self.session_label(),
            correlation_id = %self.audit_context.correlation_id,
            index,
            target = %target,
            "dispatching call"
        );
        self.audit.emit(
            self.audit_call("call.dispatched", index, AuditOutcome::Success)
                .with_metadata("active_calls", active_calls.to_string()),
        );
        self.publish();

        let call_id = match self.placement.place(&request).await {
            Ok(call_id) => call_id,
            Err(error) => {
                warn!(
                    event_name = "sequence.call.dispatch_failed",
                    session_id = self.session_label(),
                    correlation_id = %self.audit_context.correlation_id,
                    index,
                    error = %error,
                    "call placement rejected the dispatch"
                );
                self.record_mut(index)?.fail(error.reason())?;
                self.settle_failed(index, error.reason());
                return Ok(false);
            }
        };
        self.record_mut(index)?.mark_in_progress(call_id.clone())?;
        self.publish();

        let records = &mut self.records;
        let snapshots = &self.snapshots;
        let outcome = self
            .monitor
            .watch(&call_id, |status| {
                if let Some(record) = records.get_mut(index) {
                    record.observe(status);
                }
                snapshots.send_modify(|snapshot| {
                    if let Some(record) = snapshot.records.get_mut(index) {
                        record.observe(status);
                    }
                });
            })
            .await;

        let result = match outcome {
            MonitorOutcome::Ended(result) => result,
            failed => {
                let reason = failed.failure_reason().unwrap_or_default();
                self.record_mut(index)?.fail(reason.clone())?;
                self.settle_failed(index, &reason);
                return Ok(false);
            }
        };

        let transcript = result.transcript_text().map(str::to_string);
        self.record_mut(index)?.complete(result)?;
        self.audit.emit(self.audit_call("call.completed", index, AuditOutcome::Success));
        self.publish();

        let Some(transcript) = transcript else {
            return Ok(false);
        };

        match self.extractor.extract(&transcript, &descriptor.extracted_info).await {
            Ok(insight) => {
                match self.negotiation.as_mut() {
                    Some(context) => context.absorb(&insight),
                    None => self.negotiation = Some(NegotiationContext::from_insight(&insight)),
                }
                let has_new_questions = insight.pending_questions().is_some();
                let mut event = self.audit_insight(index, AuditOutcome::Success);
                if let Some(price) = &insight.price {
                    event = event.with_metadata("price", price.clone());
                }
                self.audit.emit(event);
                self.record_mut(index)?.attach_insight(insight)?;
                Ok(has_new_questions)
            }
            Err(error) => {
                warn!(
                    event_name = "insight.extraction_failed",
                    session_id = self.session_label(),
                    correlation_id = %self.audit_context.correlation_id,
                    index,
                    error = %error,
                    "continuing without call insight"
                );
                self.audit.emit(
                    self.audit_insight(index, AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
                self.record_mut(index)?.record_insight_error(error.to_string())?;
                self.publish();
                Ok(false)
            }
        }
    }

    fn halt(&mut self, error: &SequenceError) {
        if self.state != SequenceState::Running {
            return;
        }
        let index = self.current_index;
        if let Some(record) = self.records.get_mut(index).filter(|record| record.status.is_active()) {
            let _ = record.fail(format!("sequence halted: {error}"));
        }
        warn!(
            event_name = "sequence.halted",
            session_id = self.session_label(),
            correlation_id = %self.audit_context.correlation_id,
            index,
            error = %error,
            "call sequence halted"
        );
        if let Err(transition_error) =
            self.transition(SequenceEvent::Halted, SequenceContext::new(index, self.records.len()))
        {
            warn!(
                event_name = "sequence.halt_rejected",
                session_id = self.session_label(),
                error = %transition_error,
                "sequence could not be halted"
            );
        }
        self.pending_questions.clear();
        self.publish();
    }

    fn settle_failed(&mut self, index: usize, reason: &str) {
        self.audit.emit(
            self.audit_call("call.failed", index, AuditOutcome::Failed)
                .with_metadata("reason", reason),
        );
        self.publish();
    }

    fn transition(
        &mut self,
        event: SequenceEvent,
        context: SequenceContext,
    ) -> Result<TransitionOutcome, SequenceError> {
        let outcome = self.engine.apply_with_audit(
            &self.state,
            &event,
            &context,
            self.audit.as_ref(),
            &self.audit_context,
        )?;
        self.state = outcome.to;
        Ok(outcome)
    }

    fn record_mut(&mut self, index: usize) -> Result<&mut CallRecord, SequenceError> {
        let queue_len = self.records.len();
        self.records.get_mut(index).ok_or_else(|| {
            SequenceError::Flow(FlowTransitionError::IndexOutOfRange { index, queue_len })
        })
    }

    fn audit_call(&self, event_type: &str, index: usize, outcome: AuditOutcome) -> AuditEvent {
        let status = self.records.get(index).map(|record| record.status).unwrap_or(CallStatus::Idle);
        AuditEvent::new(&self.audit_context, event_type, AuditCategory::Call, outcome)
            .with_metadata("index", index.to_string())
            .with_metadata("status", status.as_str())
    }

    fn audit_insight(&self, index: usize, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(&self.audit_context, "insight.extracted", AuditCategory::Insight, outcome)
            .with_metadata("index", index.to_string())
    }

    fn session_label(&self) -> &str {
        self.audit_context.session_id.as_deref().unwrap_or("-")
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

fn dispatch_index(outcome: &TransitionOutcome) -> Result<usize, SequenceError> {
    outcome.dispatch_index().ok_or_else(|| {
        SequenceError::Domain(DomainError::InvariantViolation(format!(
            "transition {:?} -> {:?} did not dispatch a target",
            outcome.from, outcome.to
        )))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use handl_core::audit::{AuditContext, InMemoryAuditSink};
    use handl_core::domain::call::{CallInsight, CallStatus, RemoteCallStatus};
    use handl_core::domain::target::CallTarget;
    use handl_core::domain::task::{CallType, ExtractedInfo, InfoRequest, TaskDescriptor};
    use handl_core::flows::{FlowTransitionError, SequenceState};

    use super::{CallSequencer, SequenceError};
    use crate::telephony::{CallStatusReport, PlacementError};
    use crate::testing::{DialScript, FakeTelephony, ScriptedInsights};

    struct Harness {
        sequencer: CallSequencer,
        telephony: Arc<FakeTelephony>,
        insights: Arc<ScriptedInsights>,
        audit: InMemoryAuditSink,
    }

    fn harness(dials: Vec<DialScript>, insights: Vec<CallInsight>) -> Harness {
        let telephony = Arc::new(FakeTelephony::new(dials));
        let insights = Arc::new(ScriptedInsights::new(insights));
        let audit = InMemoryAuditSink::default();
        let sequencer = CallSequencer::new(
            telephony.clone(),
            insights.clone(),
            Arc::new(audit.clone()),
            AuditContext::new(Some("session-test".to_string()), "req-test", "call-sequencer"),
        );
        Harness { sequencer, telephony, insights, audit }
    }

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor {
            call_type: Some(CallType::CallBusinesses),
            call_objective: Some("Get a quote for an iPhone 13 screen repair".to_string()),
            extracted_info: ExtractedInfo {
                service: Some("screen repair".to_string()),
                location: Some("San Jose".to_string()),
                ..ExtractedInfo::default()
            },
            ..TaskDescriptor::default()
        }
    }

    fn targets(names: &[&str]) -> Vec<CallTarget> {
        names
            .iter()
            .enumerate()
            .map(|(position, name)| {
                CallTarget::new(Some(name.to_string()), format!("+1555010{position}"))
            })
            .collect()
    }

    fn priced(price: &str) -> CallInsight {
        CallInsight {
            summary: format!("Quoted {price}."),
            price: Some(price.to_string()),
            ..CallInsight::default()
        }
    }

    fn with_question(price: &str) -> CallInsight {
        CallInsight {
            has_new_questions: true,
            new_questions: vec![InfoRequest::new("device_color", "What color is the phone?", true)],
            ..priced(price)
        }
    }

    async fn start(harness: &mut Harness, names: &[&str]) -> SequenceState {
        let descriptor = descriptor();
        let index = harness.sequencer.begin(targets(names), &descriptor).expect("begin");
        harness.sequencer.drive(&descriptor, index).await.expect("drive")
    }

    #[tokio::test(start_paused = true)]
    async fn two_targets_with_pause_and_redial_reach_finished() {
        let mut harness = harness(
            vec![
                DialScript::completes("A: the repair is 150"),
                DialScript::completes("B: what color is it?"),
                DialScript::completes("B: for a black one, 140"),
            ],
            vec![priced("150"), with_question("145"), priced("140")],
        );

        let state = start(&mut harness, &["A", "B"]).await;
        assert_eq!(state, SequenceState::Paused);
        assert_eq!(harness.sequencer.current_index(), 1);
        assert_eq!(harness.sequencer.pending_questions().len(), 1);

        let placed = harness.telephony.placed();
        assert_eq!(placed.len(), 2);
        assert!(!placed[0].generated_script.contains("Another business quoted"));
        assert!(placed[1].generated_script.contains("Another business quoted 150"));

        let mut descriptor = descriptor();
        descriptor.append_service_details("- What color is the phone? black");
        let index = harness.sequencer.resume(&descriptor).expect("resume");
        assert_eq!(index, 1);
        let state = harness.sequencer.drive(&descriptor, index).await.expect("drive");

        assert_eq!(state, SequenceState::Finished);
        let placed = harness.telephony.placed();
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[2].target_number, placed[1].target_number);
        assert!(placed[2].generated_script.contains("black"));
        let records = harness.sequencer.records();
        assert!(records.iter().all(|record| record.status == CallStatus::Completed));
        assert_eq!(records[1].dial_count, 2);
        assert_eq!(harness.insights.transcripts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_price_is_carried_to_the_next_dispatch() {
        let mut harness = harness(
            vec![
                DialScript::completes("A quoted 100"),
                DialScript::completes("B quoted 80"),
                DialScript::completes("C quoted 90"),
            ],
            vec![priced("100"), priced("80"), priced("90")],
        );

        assert_eq!(start(&mut harness, &["A", "B", "C"]).await, SequenceState::Finished);

        let placed = harness.telephony.placed();
        assert!(placed[1].generated_script.contains("quoted 100"));
        assert!(placed[2].generated_script.contains("quoted 80"));
        assert!(!placed[2].generated_script.contains("quoted 100"));
        assert_eq!(
            harness.sequencer.negotiation().and_then(|context| context.best_price_seen.as_deref()),
            Some("90")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paused_sequence_does_not_dispatch_the_next_target() {
        let mut harness = harness(
            vec![DialScript::completes("A needs more info"), DialScript::completes("B")],
            vec![with_question("100")],
        );

        assert_eq!(start(&mut harness, &["A", "B"]).await, SequenceState::Paused);
        assert_eq!(harness.telephony.placed().len(), 1);
        assert_eq!(harness.sequencer.records()[1].status, CallStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_target_fails_and_sequence_advances() {
        let mut harness = harness(
            vec![DialScript::never_ends(), DialScript::completes("B quoted 120")],
            vec![priced("120")],
        );

        assert_eq!(start(&mut harness, &["A", "B"]).await, SequenceState::Finished);

        let records = harness.sequencer.records();
        assert_eq!(records[0].status, CallStatus::Failed);
        assert_eq!(records[0].failure_reason.as_deref(), Some("timeout"));
        assert_eq!(records[0].live_status, Some(RemoteCallStatus::InProgress));
        assert_eq!(records[1].status, CallStatus::Completed);
        assert_eq!(harness.audit.events_of_type("call.failed").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_dispatch_and_poll_errors_fail_without_retry() {
        let mut harness = harness(
            vec![
                DialScript::rejected("invalid phone number"),
                DialScript::answered([Err(PlacementError::Rejected("call not found".to_string()))]),
                DialScript::answered([Ok(CallStatusReport::ended("C: sure, 75"))]),
            ],
            vec![priced("75")],
        );

        assert_eq!(start(&mut harness, &["A", "B", "C"]).await, SequenceState::Finished);

        let records = harness.sequencer.records();
        assert_eq!(records[0].failure_reason.as_deref(), Some("invalid phone number"));
        assert_eq!(records[1].failure_reason.as_deref(), Some("call not found"));
        assert_eq!(records[2].status, CallStatus::Completed);
        assert_eq!(harness.telephony.placed().len(), 3);
        assert!(records.iter().all(|record| record.dial_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_one_call_is_active() {
        let dials = (0..5).map(|n| DialScript::completes(format!("target {n}"))).collect();
        let quotes = (0..5).map(|n| priced(&format!("{}", 100 - n))).collect();
        let mut harness = harness(dials, quotes);

        assert_eq!(start(&mut harness, &["A", "B", "C", "D", "E"]).await, SequenceState::Finished);

        assert_eq!(harness.telephony.overlapping_dials(), 0);
        let dispatched = harness.audit.events_of_type("call.dispatched");
        assert_eq!(dispatched.len(), 5);
        assert!(dispatched
            .iter()
            .all(|event| event.metadata.get("active_calls").map(String::as_str) == Some("1")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insight_extraction_does_not_block_the_queue() {
        let mut harness =
            harness(vec![DialScript::completes("A"), DialScript::completes("B")], Vec::new());
        harness.insights.fail_next("analyzer returned prose");
        let receiver = harness.sequencer.subscribe();

        assert_eq!(start(&mut harness, &["A", "B"]).await, SequenceState::Finished);
        assert!(harness.sequencer.records()[0].insight.is_none());
        assert_eq!(harness.sequencer.records()[0].status, CallStatus::Completed);

        let snapshot = receiver.borrow().clone();
        let failed = snapshot.records[0].insight_error.as_deref().unwrap_or_default();
        assert!(failed.contains("analyzer returned prose"), "{failed}");
        assert!(snapshot.records[1].insight_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_is_rejected_while_running_and_clears_a_paused_sequence() {
        let mut harness = harness(vec![DialScript::completes("A")], vec![with_question("99")]);
        let descriptor = descriptor();
        let index = harness.sequencer.begin(targets(&["A"]), &descriptor).expect("begin");

        let error = harness.sequencer.abandon().expect_err("running cannot be abandoned");
        assert!(matches!(error, SequenceError::Flow(FlowTransitionError::InvalidTransition { .. })));

        harness.sequencer.drive(&descriptor, index).await.expect("drive");
        assert_eq!(harness.sequencer.state(), SequenceState::Paused);
        assert!(harness.sequencer.negotiation().is_some());

        harness.sequencer.abandon().expect("paused can be abandoned");
        assert_eq!(harness.sequencer.state(), SequenceState::NotStarted);
        assert!(harness.sequencer.negotiation().is_none());
        assert!(harness.sequencer.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_the_final_snapshot() {
        let mut harness = harness(vec![DialScript::completes("A quoted 50")], vec![priced("50")]);
        let receiver = harness.sequencer.subscribe();

        start(&mut harness, &["A"]).await;

        let snapshot = receiver.borrow().clone();
        assert_eq!(snapshot.state, SequenceState::Finished);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(
            snapshot.negotiation.and_then(|context| context.best_price_seen),
            Some("50".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drive_error_halts_the_sequence_so_it_can_be_abandoned() {
        let mut harness = harness(vec![DialScript::completes("A")], Vec::new());
        let index = harness.sequencer.begin(targets(&["A", "B"]), &descriptor()).expect("begin");
        let mut no_objective = descriptor();
        no_objective.call_objective = Some("   ".to_string());

        let error = harness.sequencer.drive(&no_objective, index).await.expect_err("no objective");

        assert_eq!(error, SequenceError::MissingObjective);
        assert_eq!(harness.sequencer.state(), SequenceState::Finished);
        assert_eq!(harness.sequencer.subscribe().borrow().state, SequenceState::Finished);
        assert!(harness.telephony.placed().is_empty());
        assert_eq!(harness.audit.events_of_type("sequence.transition_applied").len(), 2);

        harness.sequencer.abandon().expect("halted sequence can be abandoned");
        assert_eq!(harness.sequencer.state(), SequenceState::NotStarted);
    }

    #[test]
    fn begin_requires_an_objective_and_targets() {
        let mut harness = harness(Vec::new(), Vec::new());
        let mut no_objective = descriptor();
        no_objective.call_objective = None;

        assert_eq!(
            harness.sequencer.begin(targets(&["A"]), &no_objective).expect_err("no objective"),
            SequenceError::MissingObjective
        );
        assert_eq!(
            harness.sequencer.begin(Vec::new(), &descriptor()).expect_err("empty queue"),
            SequenceError::Flow(FlowTransitionError::EmptyQueue)
        );
        assert_eq!(harness.sequencer.state(), SequenceState::NotStarted);
    }
}
