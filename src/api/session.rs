/// Editor session REST API endpoints
///
/// Lets a local UI open an editor session, read the active session through the
/// registry, submit operations and move the selection. Operations return as
/// soon as they are applied locally; persistence happens in the background.
/// Step outputs and sample-data query results are cached here for the UI and
/// evicted by realtime notifications.

use crate::{
    editor::{
        registry::SessionRegistry,
        session::{EditorServices, EditorSession},
        store::{EditorSessionState, LeftSidebar, RightSidebar},
    },
    flow::{
        operations::FlowOperationRequest,
        types::{Flow, FlowVersion},
    },
    steps::{
        cache::StepOutput,
        queries::{StepQueryCache, StepQueryKey},
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Active-session registry shared with every out-of-tree consumer
    pub registry: SessionRegistry,
    /// Collaborators handed to each new session
    pub services: EditorServices,
    /// The session opened through this API, if any
    pub session: Arc<Mutex<Option<EditorSession>>>,
    /// Sample-data query results; `services.queries` must invalidate this cache
    pub queries: StepQueryCache,
}

impl AppState {
    pub fn new(registry: SessionRegistry, services: EditorServices, queries: StepQueryCache) -> Self {
        Self {
            registry,
            services,
            session: Arc::new(Mutex::new(None)),
            queries,
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<EditorSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request body for opening a session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    pub flow: Flow,
    pub flow_version: FlowVersion,
}

/// Request body for changing the selection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectStepRequest {
    pub step_name: Option<String>,
}

/// Serializable view of the session state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub flow: Flow,
    pub flow_version: FlowVersion,
    pub selected_step: Option<String>,
    pub saving: bool,
    pub right_sidebar: RightSidebar,
    pub left_sidebar: LeftSidebar,
    pub read_only: bool,
    pub save_error: Option<String>,
}

impl From<EditorSessionState> for SessionView {
    fn from(state: EditorSessionState) -> Self {
        Self {
            flow: state.flow,
            flow_version: state.flow_version,
            selected_step: state.selected_step,
            saving: state.saving,
            right_sidebar: state.right_sidebar,
            left_sidebar: state.left_sidebar,
            read_only: state.read_only,
            save_error: state.save_error,
        }
    }
}

/// Response for an applied operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub flow_version: FlowVersion,
    /// False when the queue was halted and the edit will not be persisted
    pub enqueued: bool,
}

/// Response for a step output lookup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutputResponse {
    pub step_name: String,
    pub output: Option<StepOutput>,
    pub stale: bool,
}

/// Response for a sample-data query lookup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDataResponse {
    pub step_name: String,
    pub flow_version_id: String,
    pub data: Option<Value>,
}

/// Create editor session routes
pub fn create_session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/active", delete(close_session))
        .route("/api/session", get(get_session))
        .route("/api/session/operations", post(apply_operation))
        .route("/api/session/selection", put(select_step))
        .route("/api/session/steps/{step}/output", get(get_step_output))
        .route("/api/session/steps/{step}/output", put(set_step_output))
        .route("/api/session/steps/{step}/sample-data", get(get_sample_data))
        .route("/api/session/steps/{step}/sample-data", put(set_sample_data))
}

/// Open a session and make it the active one
///
/// POST /api/sessions
/// Body: { "flow": { ... }, "flowVersion": { ... } }
async fn open_session(
    State(state): State<AppState>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    if payload.flow.id != payload.flow_version.flow_id {
        tracing::warn!(
            "Version {} belongs to flow {}, not {}",
            payload.flow_version.id,
            payload.flow_version.flow_id,
            payload.flow.id
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    let session = EditorSession::mount(
        &state.registry,
        payload.flow,
        payload.flow_version,
        &state.services,
    );
    let view = SessionView::from(session.state());

    let previous = state.session().replace(session);
    // Superseded by the mount above; dropping only stops its listener.
    drop(previous);

    Ok(Json(view))
}

/// Close the session opened through this API
///
/// DELETE /api/sessions/active
async fn close_session(State(state): State<AppState>) -> StatusCode {
    let closed = state.session().take();
    match closed {
        Some(session) => {
            if session.queue().size() > 0 {
                tracing::warn!("Closing session with {} unsaved operations", session.queue().size());
            }
            drop(session);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Read the active session through the registry
///
/// GET /api/session
async fn get_session(State(state): State<AppState>) -> Result<Json<SessionView>, StatusCode> {
    state
        .registry
        .active_state()
        .map(|session| Json(SessionView::from(session)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Apply an operation to the open session
///
/// POST /api/session/operations
/// Body: { "type": "DELETE_ACTION", "request": { "names": ["step_2"] } }
async fn apply_operation(
    State(state): State<AppState>,
    Json(operation): Json<FlowOperationRequest>,
) -> Result<Json<OperationResponse>, StatusCode> {
    let guard = state.session();
    let session = guard.as_ref().ok_or(StatusCode::NOT_FOUND)?;

    if session.state().read_only {
        tracing::warn!("Rejected {} on read-only session", operation.type_name());
        return Err(StatusCode::CONFLICT);
    }

    match session.apply(operation) {
        Ok(update) => Ok(Json(OperationResponse {
            flow_version: update.flow_version,
            enqueued: update.enqueued.is_ok(),
        })),
        Err(e) => {
            tracing::error!("Failed to apply operation: {}", e);
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
    }
}

/// Select a step, or clear the selection with `null`
///
/// PUT /api/session/selection
/// Body: { "stepName": "step_1" }
async fn select_step(
    State(state): State<AppState>,
    Json(payload): Json<SelectStepRequest>,
) -> Result<Json<Value>, StatusCode> {
    let guard = state.session();
    let session = guard.as_ref().ok_or(StatusCode::NOT_FOUND)?;

    session
        .store()
        .select_step(payload.step_name.as_deref())
        .map_err(|e| {
            tracing::warn!("{}", e);
            StatusCode::UNPROCESSABLE_ENTITY
        })?;

    Ok(Json(json!({ "selectedStep": payload.step_name })))
}

/// Read the cached test output of a step
///
/// GET /api/session/steps/{step}/output
async fn get_step_output(
    State(state): State<AppState>,
    Path(step): Path<String>,
) -> Result<Json<StepOutputResponse>, StatusCode> {
    let guard = state.session();
    let session = guard.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let cache = session.step_cache();

    Ok(Json(StepOutputResponse {
        output: cache.get_step_data(&step),
        stale: cache.is_stale(&step),
        step_name: step,
    }))
}

/// Store the output of a finished test run
///
/// PUT /api/session/steps/{step}/output
async fn set_step_output(
    State(state): State<AppState>,
    Path(step): Path<String>,
    Json(output): Json<StepOutput>,
) -> Result<StatusCode, StatusCode> {
    let guard = state.session();
    let session = guard.as_ref().ok_or(StatusCode::NOT_FOUND)?;

    if !session.store().with_state(|s| s.flow_version.contains_step(&step)) {
        return Err(StatusCode::NOT_FOUND);
    }
    session.step_cache().set_step_data(&step, output);
    Ok(StatusCode::NO_CONTENT)
}

/// Query key of `step` in the open session's current version
///
/// Fails with 404 when no session is open or the version has no such step.
fn sample_data_key(state: &AppState, step: &str) -> Result<StepQueryKey, StatusCode> {
    let guard = state.session();
    let session = guard.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    session
        .store()
        .with_state(|s| {
            s.flow_version
                .contains_step(step)
                .then(|| StepQueryKey::new(s.flow_version.id.clone(), step))
        })
        .ok_or(StatusCode::NOT_FOUND)
}

/// Read the cached sample data of a step
///
/// GET /api/session/steps/{step}/sample-data
async fn get_sample_data(
    State(state): State<AppState>,
    Path(step): Path<String>,
) -> Result<Json<SampleDataResponse>, StatusCode> {
    let key = sample_data_key(&state, &step)?;

    Ok(Json(SampleDataResponse {
        data: state.queries.get(&key),
        step_name: key.step_id,
        flow_version_id: key.flow_version_id,
    }))
}

/// Store sample data fetched for a step
///
/// PUT /api/session/steps/{step}/sample-data
/// Body: any JSON value
async fn set_sample_data(
    State(state): State<AppState>,
    Path(step): Path<String>,
    Json(data): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    let key = sample_data_key(&state, &step)?;
    tracing::debug!("📥 Caching sample data for step {} in version {}", key.step_id, key.flow_version_id);
    state.queries.insert(key, data);
    Ok(StatusCode::NO_CONTENT)
}
