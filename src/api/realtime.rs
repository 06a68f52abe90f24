/// Realtime push endpoint
///
/// The backend (or a test harness) posts step notifications here; they are
/// fanned out to every open session's invalidation listener.

use crate::api::session::AppState;
use crate::backend::realtime::RealtimeEvent;
use axum::{extract::State, response::Json, routing::post, Router};
use serde_json::{json, Value};

/// Create realtime routes
pub fn create_realtime_routes() -> Router<AppState> {
    Router::new().route("/realtime/events", post(push_event))
}

/// Publish a realtime event
///
/// POST /realtime/events
/// Body: { "type": "STEP_TESTED", "flowId": "...", "flowVersionId": "...", "stepId": "step_1" }
async fn push_event(State(state): State<AppState>, Json(event): Json<RealtimeEvent>) -> Json<Value> {
    let delivered = state.services.realtime.publish(event);
    Json(json!({ "delivered": delivered }))
}
