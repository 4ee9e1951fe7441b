pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, SerialCallFlow};
pub use states::{
    FlowType, SequenceAction, SequenceContext, SequenceEvent, SequenceState, TransitionOutcome,
};
