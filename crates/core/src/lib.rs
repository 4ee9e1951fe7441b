pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod negotiation;
pub mod queue;
pub mod readiness;

pub use domain::call::{
    CallId, CallInsight, CallRecord, CallResult, CallStatus, RemoteCallStatus,
};
pub use domain::session::SessionId;
pub use domain::target::CallTarget;
pub use domain::task::{
    CallType, ExtractedInfo, InfoRequest, InputKind, PreferredCriteria, ResponseKind,
    TaskDescriptor,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, SequenceAction, SequenceEvent, SequenceState, SerialCallFlow};
pub use negotiation::NegotiationContext;
pub use queue::{
    DirectoryListing, DirectoryQuery, ManualTarget, QueueError, SearchSelection,
    TargetQueueBuilder,
};
pub use readiness::{AnswerError, FieldAnswer, MissingInfoResolver, ReadinessGap};
