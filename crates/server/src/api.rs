//! Session API.
//!
//! - `POST   /api/v1/sessions`                : create a session
//! - `GET    /api/v1/sessions/{id}`           : descriptor and sequence snapshot
//! - `DELETE /api/v1/sessions/{id}`           : drop a session that is not dialing
//! - `POST   /api/v1/sessions/{id}/messages`  : analyze one user message
//! - `POST   /api/v1/sessions/{id}/answers`   : submit clarification answers
//! - `POST   /api/v1/sessions/{id}/search`    : directory search for the task
//! - `POST   /api/v1/sessions/{id}/calls`     : confirm the queue and start dialing
//! - `DELETE /api/v1/sessions/{id}/sequence`  : abandon a paused or finished sequence
//!
//! Dialing runs in a background task that holds the session lock, so any
//! mutating request against a session with a call underway gets a 409.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use handl_agent::sequencer::SequenceSnapshot;
use handl_agent::{AgentRuntime, AnswerOutcome, CallPlan, Session, SessionError, SessionView, TurnOutcome};
use handl_core::domain::session::SessionId;
use handl_core::domain::task::TaskDescriptor;
use handl_core::errors::{ApplicationError, InterfaceError};
use handl_core::flows::SequenceState;
use handl_core::queue::SearchSelection;
use handl_core::readiness::FieldAnswer;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct SessionHandle {
    session: Arc<Mutex<Session>>,
    descriptor: watch::Receiver<TaskDescriptor>,
    sequence: watch::Receiver<SequenceSnapshot>,
}

#[derive(Clone)]
pub struct ApiState {
    runtime: AgentRuntime,
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl ApiState {
    pub fn new(runtime: AgentRuntime) -> Self {
        Self { runtime, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<FieldAnswer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsAccepted {
    pub state: SequenceState,
    pub dispatch_index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/{id}/messages", post(post_message))
        .route("/api/v1/sessions/{id}/answers", post(post_answers))
        .route("/api/v1/sessions/{id}/search", post(post_search))
        .route("/api/v1/sessions/{id}/calls", post(post_calls))
        .route("/api/v1/sessions/{id}/sequence", delete(abandon_sequence))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_session(State(state): State<ApiState>) -> (StatusCode, Json<SessionCreated>) {
    let session = state.runtime.new_session();
    let session_id = session.id().clone();
    let handle = SessionHandle {
        descriptor: session.subscribe_descriptor(),
        sequence: session.subscribe_sequence(),
        session: Arc::new(Mutex::new(session)),
    };
    state.sessions.write().await.insert(session_id.clone(), handle);

    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<SessionView>> {
    let correlation_id = correlation_id();
    let handle = find(&state, &id, &correlation_id).await?;

    let descriptor = handle.descriptor.borrow().clone();
    let sequence = handle.sequence.borrow().clone();
    Ok(Json(SessionView {
        id: SessionId(id),
        call_ready: descriptor.is_call_ready(),
        descriptor,
        sequence,
    }))
}

async fn delete_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id();
    // Held across the removal so no call can start in between.
    let _session = lock(&state, &id, &correlation_id).await?;

    state.sessions.write().await.remove(&SessionId(id.clone()));
    info!(
        event_name = "api.session.deleted",
        session_id = %id,
        correlation_id = %correlation_id,
        "session dropped"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn post_message(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<TurnOutcome>> {
    let correlation_id = correlation_id();
    let mut session = lock(&state, &id, &correlation_id).await?;

    let outcome = session
        .handle_message(&request.content)
        .await
        .map_err(|error| session_error(error, &correlation_id))?;
    Ok(Json(outcome))
}

async fn post_answers(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(request): Json<AnswersRequest>,
) -> ApiResult<(StatusCode, Json<AnswerOutcome>)> {
    let correlation_id = correlation_id();
    let mut session = lock(&state, &id, &correlation_id).await?;

    let outcome = session
        .submit_answers(&request.answers)
        .await
        .map_err(|error| session_error(error, &correlation_id))?;

    match outcome {
        AnswerOutcome::ResumeScheduled { .. } => {
            spawn_dialing(session, correlation_id);
            Ok((StatusCode::ACCEPTED, Json(outcome)))
        }
        AnswerOutcome::Turn(_) => Ok((StatusCode::OK, Json(outcome))),
    }
}

async fn post_search(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<SearchSelection>> {
    let correlation_id = correlation_id();
    let mut session = lock(&state, &id, &correlation_id).await?;

    let selection =
        session.search().await.map_err(|error| session_error(error, &correlation_id))?;
    Ok(Json(selection))
}

async fn post_calls(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(plan): Json<CallPlan>,
) -> ApiResult<(StatusCode, Json<CallsAccepted>)> {
    let correlation_id = correlation_id();
    let mut session = lock(&state, &id, &correlation_id).await?;

    let dispatch_index =
        session.prepare_calls(&plan).map_err(|error| session_error(error, &correlation_id))?;
    let accepted = CallsAccepted { state: session.sequence_state(), dispatch_index };
    spawn_dialing(session, correlation_id);

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn abandon_sequence(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id();
    let mut session = lock(&state, &id, &correlation_id).await?;

    session.abandon_sequence().map_err(|error| session_error(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

async fn find(state: &ApiState, id: &str, correlation_id: &str) -> ApiResult<SessionHandle> {
    state.sessions.read().await.get(&SessionId(id.to_string())).cloned().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "Session not found.".to_string(),
                detail: format!("no session with id {id}"),
                correlation_id: correlation_id.to_string(),
            }),
        )
    })
}

/// Fails with 409 instead of waiting while a background call holds the session.
async fn lock(
    state: &ApiState,
    id: &str,
    correlation_id: &str,
) -> ApiResult<OwnedMutexGuard<Session>> {
    let handle = find(state, id, correlation_id).await?;
    handle.session.try_lock_owned().map_err(|_| {
        warn!(
            event_name = "api.session.busy",
            session_id = id,
            correlation_id,
            "session is busy with an active call"
        );
        interface_error(InterfaceError::Conflict {
            message: "a call is in progress for this session".to_string(),
            correlation_id: correlation_id.to_string(),
        })
    })
}

fn spawn_dialing(mut session: OwnedMutexGuard<Session>, correlation_id: String) {
    tokio::spawn(async move {
        let session_id = session.id().clone();
        match session.run_pending().await {
            Ok(state) => info!(
                event_name = "api.sequence.settled",
                session_id = %session_id,
                correlation_id = %correlation_id,
                state = state.as_str(),
                "background dialing stopped"
            ),
            Err(error) => error!(
                event_name = "api.sequence.failed",
                session_id = %session_id,
                correlation_id = %correlation_id,
                error = %error,
                "background dialing failed"
            ),
        }
    });
}

fn session_error(error: SessionError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    interface_error(ApplicationError::from(error).into_interface(correlation_id))
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            error: error.user_message().to_string(),
            detail: error.to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}
