//! Agent runtime: conversation analysis and sequential call orchestration.
//!
//! The crate turns free-form chat into a [`TaskDescriptor`] and, once that
//! descriptor is call-ready, dials a queue of targets strictly one at a time:
//!
//! 1. **Analysis** (`conversation`): each user turn is analyzed against the
//!    whole history; only task updates change the descriptor.
//! 2. **Queueing** (`session`, `directory`): manual numbers and selected
//!    directory listings become the dial order.
//! 3. **Sequencing** (`sequencer`, `monitor`): a call is placed, polled to a
//!    terminal status, analyzed by `insight`, and only then does the next one
//!    start. Questions raised by a call pause the queue until answered.
//!
//! Collaborators (`LlmClient`, `CallPlacement`, `DirectorySearch`) are traits so
//! the server can plug in HTTP clients and tests can plug in scripted fakes.
//!
//! [`TaskDescriptor`]: handl_core::domain::task::TaskDescriptor

pub mod conversation;
pub mod directory;
pub mod guardrails;
pub mod insight;
pub mod llm;
pub mod monitor;
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod telephony;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use runtime::{AgentRuntime, Collaborators};
pub use session::{AnswerOutcome, CallPlan, Session, SessionError, SessionView, TurnOutcome};
