//! Scripted collaborators for exercising the agent without network access.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;
use handl_core::domain::call::{CallId, CallInsight, RemoteCallStatus};
use handl_core::domain::task::ExtractedInfo;
use handl_core::queue::{DirectoryListing, DirectoryQuery};

use crate::directory::{DirectoryError, DirectorySearch};
use crate::insight::{CallInsightExtractor, InsightError};
use crate::llm::{ChatMessage, LlmClient};
use crate::telephony::{CallPlacement, CallRequest, CallStatusReport, PlacementError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns queued completions in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|text| Ok(text.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, error: impl Into<String>) {
        lock(&self.responses).push_back(Err(error.into()));
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        lock(&self.requests).push(messages.to_vec());
        match lock(&self.responses).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("no scripted completion left")),
        }
    }
}

/// Hands out queued insights; an empty queue yields an insight with nothing in it.
#[derive(Default)]
pub struct ScriptedInsights {
    insights: Mutex<VecDeque<Result<CallInsight, InsightError>>>,
    transcripts: Mutex<Vec<String>>,
}

impl ScriptedInsights {
    pub fn new(insights: impl IntoIterator<Item = CallInsight>) -> Self {
        Self {
            insights: Mutex::new(insights.into_iter().map(Ok).collect()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// The next extraction fails with a malformed-response error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        lock(&self.insights).push_front(Err(InsightError::MalformedResponse(reason.into())));
    }

    pub fn transcripts(&self) -> Vec<String> {
        lock(&self.transcripts).clone()
    }
}

#[async_trait]
impl CallInsightExtractor for ScriptedInsights {
    async fn extract(
        &self,
        transcript: &str,
        _context: &ExtractedInfo,
    ) -> Result<CallInsight, InsightError> {
        lock(&self.transcripts).push(transcript.to_string());
        lock(&self.insights).pop_front().unwrap_or_else(|| Ok(CallInsight::default()))
    }
}

/// How one dial behaves: acceptance, then the status fetches in order.
#[derive(Clone, Debug)]
pub struct DialScript {
    accept: Result<(), PlacementError>,
    polls: VecDeque<Result<CallStatusReport, PlacementError>>,
}

impl DialScript {
    pub fn answered<I>(polls: I) -> Self
    where
        I: IntoIterator<Item = Result<CallStatusReport, PlacementError>>,
    {
        Self { accept: Ok(()), polls: polls.into_iter().collect() }
    }

    /// Answers, then ends with `transcript` on the first status fetch.
    pub fn completes(transcript: impl Into<String>) -> Self {
        Self::answered([Ok(CallStatusReport::ended(transcript))])
    }

    /// Reports in-progress on every fetch.
    pub fn never_ends() -> Self {
        Self::answered([])
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { accept: Err(PlacementError::Rejected(reason.into())), polls: VecDeque::new() }
    }
}

#[derive(Default)]
struct TelephonyState {
    scripts: VecDeque<DialScript>,
    calls: HashMap<CallId, VecDeque<Result<CallStatusReport, PlacementError>>>,
    poll_counts: HashMap<CallId, usize>,
    placed: Vec<CallRequest>,
    open: BTreeSet<String>,
    overlapping_dials: usize,
    next_id: usize,
}

/// Call placement driven by [`DialScript`]s, one per dial in order.
///
/// A call counts as open from acceptance until it reports `ended` or an
/// explicit error. Dialing while another call is open is counted as an overlap.
#[derive(Default)]
pub struct FakeTelephony {
    state: Mutex<TelephonyState>,
}

impl FakeTelephony {
    pub fn new(scripts: impl IntoIterator<Item = DialScript>) -> Self {
        Self {
            state: Mutex::new(TelephonyState {
                scripts: scripts.into_iter().collect(),
                ..TelephonyState::default()
            }),
        }
    }

    /// Binds the next script to `call_id` without a dial, for polling alone.
    pub fn prime(&self, call_id: &CallId) {
        let mut state = lock(&self.state);
        if let Some(script) = state.scripts.pop_front() {
            state.calls.insert(call_id.clone(), script.polls);
            state.open.insert(call_id.0.clone());
        }
    }

    pub fn placed(&self) -> Vec<CallRequest> {
        lock(&self.state).placed.clone()
    }

    pub fn poll_count(&self, call_id: &CallId) -> usize {
        lock(&self.state).poll_counts.get(call_id).copied().unwrap_or(0)
    }

    pub fn overlapping_dials(&self) -> usize {
        lock(&self.state).overlapping_dials
    }
}

#[async_trait]
impl CallPlacement for FakeTelephony {
    async fn place(&self, request: &CallRequest) -> Result<CallId, PlacementError> {
        let mut state = lock(&self.state);
        if !state.open.is_empty() {
            state.overlapping_dials += 1;
        }
        state.placed.push(request.clone());

        let script = state
            .scripts
            .pop_front()
            .ok_or_else(|| PlacementError::Rejected("no scripted dial left".to_string()))?;
        script.accept?;

        state.next_id += 1;
        let call_id = CallId(format!("fake-call-{}", state.next_id));
        state.open.insert(call_id.0.clone());
        state.calls.insert(call_id.clone(), script.polls);
        Ok(call_id)
    }

    async fn status(&self, call_id: &CallId) -> Result<CallStatusReport, PlacementError> {
        let mut state = lock(&self.state);
        *state.poll_counts.entry(call_id.clone()).or_default() += 1;

        let polls = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| PlacementError::Rejected(format!("unknown call {call_id}")))?;
        let report = polls
            .pop_front()
            .unwrap_or_else(|| Ok(CallStatusReport::live(RemoteCallStatus::InProgress)));

        let closed = match &report {
            Ok(report) => report.status.is_terminal(),
            Err(PlacementError::Rejected(_)) => true,
            Err(PlacementError::Transport(_)) => false,
        };
        if closed {
            state.open.remove(&call_id.0);
        }
        report
    }
}

/// Returns the same listings for every query and records the queries.
pub struct FakeDirectory {
    listings: Mutex<Result<Vec<DirectoryListing>, DirectoryError>>,
    queries: Mutex<Vec<DirectoryQuery>>,
}

impl FakeDirectory {
    pub fn with_listings(listings: Vec<DirectoryListing>) -> Self {
        Self { listings: Mutex::new(Ok(listings)), queries: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: DirectoryError) -> Self {
        Self { listings: Mutex::new(Err(error)), queries: Mutex::new(Vec::new()) }
    }

    pub fn queries(&self) -> Vec<DirectoryQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl DirectorySearch for FakeDirectory {
    async fn search(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryListing>, DirectoryError> {
        lock(&self.queries).push(query.clone());
        let listings = lock(&self.listings).clone()?;
        Ok(listings.into_iter().take(query.limit).collect())
    }
}

/// A listing with a phone number, rating and open flag.
pub fn listing(name: &str, phone: &str, rating: f64, is_open: Option<bool>) -> DirectoryListing {
    DirectoryListing {
        name: name.to_string(),
        address: format!("1 {name} Way"),
        phone_number: Some(phone.to_string()),
        rating: Some(rating),
        total_ratings: Some(42),
        place_id: format!("place-{}", name.to_ascii_lowercase().replace(' ', "-")),
        is_open,
    }
}
