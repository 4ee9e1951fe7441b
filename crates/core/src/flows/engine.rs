use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowType, SequenceAction, SequenceContext, SequenceEvent, SequenceState, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> SequenceState;
    fn transition(
        &self,
        current: &SequenceState,
        event: &SequenceEvent,
        context: &SequenceContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// One target at a time, in queue order, pausing when a call raises questions.
#[derive(Clone, Debug, Default)]
pub struct SerialCallFlow;

impl FlowDefinition for SerialCallFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::SerialCalls
    }

    fn initial_state(&self) -> SequenceState {
        SequenceState::NotStarted
    }

    fn transition(
        &self,
        current: &SequenceState,
        event: &SequenceEvent,
        context: &SequenceContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_serial_calls(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> SequenceState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &SequenceState,
        event: &SequenceEvent,
        context: &SequenceContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &SequenceState,
        event: &SequenceEvent,
        context: &SequenceContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "sequence.transition_applied",
                        AuditCategory::Sequence,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event))
                    .with_metadata("index", context.current_index.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "sequence.transition_rejected",
                        AuditCategory::Sequence,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SerialCallFlow> {
    fn default() -> Self {
        Self::new(SerialCallFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot start a call sequence with an empty target queue")]
    EmptyQueue,
    #[error("target index {index} is outside a queue of {queue_len}")]
    IndexOutOfRange { index: usize, queue_len: usize },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SequenceState, event: SequenceEvent },
}

fn transition_serial_calls(
    current: &SequenceState,
    event: &SequenceEvent,
    context: &SequenceContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use SequenceAction::{DiscardNegotiationContext, Dispatch, Finish, SurfaceQuestions};
    use SequenceEvent::{Abandoned, AnswersSubmitted, CallSettled, Halted, QueueConfirmed};
    use SequenceState::{Finished, NotStarted, Paused, Running};

    let index = context.current_index;
    let (to, actions) = match (current, event) {
        (NotStarted, QueueConfirmed) => {
            if context.queue_len == 0 {
                return Err(FlowTransitionError::EmptyQueue);
            }
            (Running, vec![Dispatch { index: 0 }])
        }
        (Running, CallSettled) => {
            ensure_in_range(context)?;
            if context.has_new_questions {
                (Paused, vec![SurfaceQuestions { index }])
            } else if index + 1 >= context.queue_len {
                (Finished, vec![Finish])
            } else {
                (Running, vec![Dispatch { index: index + 1 }])
            }
        }
        (Paused, AnswersSubmitted) => {
            ensure_in_range(context)?;
            (Running, vec![Dispatch { index }])
        }
        (Running, Halted) => (Finished, vec![Finish]),
        (Paused, Abandoned) | (Finished, Abandoned) => {
            (NotStarted, vec![DiscardNegotiationContext])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

fn ensure_in_range(context: &SequenceContext) -> Result<(), FlowTransitionError> {
    if context.current_index < context.queue_len {
        Ok(())
    } else {
        Err(FlowTransitionError::IndexOutOfRange {
            index: context.current_index,
            queue_len: context.queue_len,
        })
    }
}
