use std::sync::Arc;

use handl_core::audit::{AuditSink, NoopAuditSink};
use handl_core::domain::session::SessionId;
use handl_core::queue::DirectoryQuery;
use tracing::info;

use crate::conversation::ConversationAnalyzer;
use crate::directory::DirectorySearch;
use crate::guardrails::SessionPolicy;
use crate::insight::CallInsightExtractor;
use crate::session::Session;
use crate::telephony::CallPlacement;

/// The outside services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn ConversationAnalyzer>,
    pub extractor: Arc<dyn CallInsightExtractor>,
    pub placement: Arc<dyn CallPlacement>,
    pub directory: Arc<dyn DirectorySearch>,
}

/// Builds sessions that share collaborators, policy and audit sink.
#[derive(Clone)]
pub struct AgentRuntime {
    collaborators: Collaborators,
    policy: SessionPolicy,
    audit: Arc<dyn AuditSink>,
    search_limit: usize,
}

impl AgentRuntime {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            policy: SessionPolicy::default(),
            audit: Arc::new(NoopAuditSink),
            search_limit: DirectoryQuery::DEFAULT_LIMIT,
        }
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn new_session(&self) -> Session {
        let id = SessionId::generate();
        info!(event_name = "session.created", session_id = %id, "session created");
        Session::new(
            id,
            &self.collaborators,
            self.policy.clone(),
            self.audit.clone(),
            self.search_limit,
        )
    }
}
