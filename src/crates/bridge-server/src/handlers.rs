//! Request handlers for the bridge surface.

use crate::response::{error, ok};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bridge_core::Snapshot;
use bridge_llm::{ProfileSettings, Provider};
use bridge_pipeline::{SchedulerConfig, TurnRequest};
use serde::Deserialize;
use serde_json::{json, Value};

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    ok(json!({
        "status": "ok",
        "scheduler": state.scheduler.state(),
        "queues": {
            "goals": state.queues.goals.len(),
            "tasks": state.queues.tasks.len(),
            "patches": state.queues.patches.len(),
            "reviews": state.queues.reviews.len(),
        },
        "pendingActions": state.pending.len(),
    }))
}

/// GET /api/state — the mirror as the agent sees it.
pub async fn get_state(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let snapshot = state.mirror.snapshot();
    ok(json!({
        "graphs": snapshot.graphs,
        "prototypes": snapshot.prototypes,
        "edges": snapshot.edges,
        "activeGraphId": snapshot.active_graph_id,
        "openGraphIds": snapshot.open_graph_ids,
        "summary": { "lastUpdate": snapshot.last_update },
    }))
}

/// POST /api/state — the UI registers or refreshes its snapshot.
pub async fn register_state(
    State(state): State<AppState>,
    Json(snapshot): Json<Snapshot>,
) -> impl axum::response::IntoResponse {
    state.mirror.smart_merge(snapshot);
    let merged = state.mirror.snapshot();
    ok(json!({
        "graphCount": merged.graphs.len(),
        "prototypeCount": merged.prototypes.len(),
        "lastUpdate": merged.last_update,
    }))
}

/// GET /api/actions/pending — the UI's poll loop.
pub async fn pending_actions(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    ok(state.pending.poll())
}

/// POST /api/actions/{batch_id}/complete
pub async fn complete_action(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> impl axum::response::IntoResponse {
    if state.pending.complete(&batch_id) {
        ok(json!({ "batchId": batch_id }))
    } else {
        error(StatusCode::NOT_FOUND, format!("unknown batch: {}", batch_id))
    }
}

#[derive(Deserialize)]
pub struct FeedbackBody {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

/// POST /api/actions/{batch_id}/feedback
pub async fn action_feedback(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> impl axum::response::IntoResponse {
    if state.pending.feedback(&batch_id, body.ok, &body.message) {
        ok(json!({ "batchId": batch_id }))
    } else {
        error(StatusCode::NOT_FOUND, format!("unknown batch: {}", batch_id))
    }
}

/// GET /api/chat/{cid} — drain feedback for one turn.
pub async fn drain_chat(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> impl axum::response::IntoResponse {
    ok(state.chat.drain(&cid))
}

/// GET /api/trace/{cid} — execution timeline for one turn.
pub async fn trace(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> impl axum::response::IntoResponse {
    ok(state.tracer.timeline(&cid))
}

/// GET /api/metrics
pub async fn metrics(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    ok(json!({
        "scheduler": state.scheduler.metrics(),
        "state": state.scheduler.state(),
    }))
}

/// GET /api/layout-settings — the presets the UI mirrors for parity.
pub async fn layout_settings() -> impl axum::response::IntoResponse {
    ok(json!({
        "algorithms": ["force", "hierarchical", "radial", "linear"],
        "modes": ["full", "partial", "auto"],
        "minNodeWidth": 160,
        "nodeHeight": 100,
        "tallNodeHeight": 140,
        "tallLabelChars": 30,
        "minPadding": 300,
        "canvas": { "min": 2000, "perNodeFactor": 400 },
    }))
}

/// POST /api/scheduler/start
pub async fn scheduler_start(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    state.scheduler.start(SchedulerConfig::default());
    ok(json!({ "state": state.scheduler.state() }))
}

/// POST /api/scheduler/stop
pub async fn scheduler_stop(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    state.scheduler.stop();
    ok(json!({ "state": state.scheduler.state() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnBody {
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
}

/// POST /api/turn — one agent turn.
pub async fn agent_turn(
    State(state): State<AppState>,
    Json(body): Json<TurnBody>,
) -> impl axum::response::IntoResponse {
    let response = state
        .coordinator
        .handle_turn(TurnRequest {
            message: body.message,
            context: body.context,
            api_key: body.api_key,
            cid: body.cid,
        })
        .await;

    ok(json!({
        "success": response.success,
        "response": response.response,
        "toolCalls": response.tool_calls,
        "goalId": response.goal_id,
        "cid": response.cid,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBody {
    pub name: String,
    pub provider: Provider,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub settings: Option<ProfileSettings>,
}

/// POST /api/profiles
pub async fn store_profile(
    State(state): State<AppState>,
    Json(body): Json<ProfileBody>,
) -> impl axum::response::IntoResponse {
    match state.profiles.store(
        body.name,
        body.provider,
        &body.api_key,
        body.model,
        body.endpoint,
        body.settings.unwrap_or_default(),
    ) {
        Ok(id) => ok(json!({ "profileId": id })),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/profiles — keys stay obfuscated.
pub async fn list_profiles(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let profiles: Vec<Value> = state
        .profiles
        .list_profiles()
        .into_iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.name,
                "provider": p.provider,
                "endpoint": p.endpoint,
                "model": p.model,
                "timestamp": p.timestamp,
                "version": p.version,
            })
        })
        .collect();
    let active = state.profiles.get_active().map(|p| p.id);
    ok(json!({ "profiles": profiles, "activeId": active }))
}

/// POST /api/profiles/{id}/activate
pub async fn activate_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> impl axum::response::IntoResponse {
    match state.profiles.set_active(&profile_id) {
        Ok(()) => ok(json!({ "activeId": profile_id })),
        Err(e) => error(StatusCode::NOT_FOUND, e.to_string()),
    }
}

/// DELETE /api/profiles/{id}
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> impl axum::response::IntoResponse {
    match state.profiles.delete(&profile_id) {
        Ok(()) => ok(json!({ "deleted": profile_id })),
        Err(e) => error(StatusCode::NOT_FOUND, e.to_string()),
    }
}
