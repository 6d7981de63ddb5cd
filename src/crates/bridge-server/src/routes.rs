//! Router assembly.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full bridge router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/state",
            get(handlers::get_state).post(handlers::register_state),
        )
        .route("/api/actions/pending", get(handlers::pending_actions))
        .route(
            "/api/actions/:batch_id/complete",
            post(handlers::complete_action),
        )
        .route(
            "/api/actions/:batch_id/feedback",
            post(handlers::action_feedback),
        )
        .route("/api/chat/:cid", get(handlers::drain_chat))
        .route("/api/trace/:cid", get(handlers::trace))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/layout-settings", get(handlers::layout_settings))
        .route("/api/scheduler/start", post(handlers::scheduler_start))
        .route("/api/scheduler/stop", post(handlers::scheduler_stop))
        .route("/api/turn", post(handlers::agent_turn))
        .route(
            "/api/profiles",
            get(handlers::list_profiles).post(handlers::store_profile),
        )
        .route(
            "/api/profiles/:profile_id/activate",
            post(handlers::activate_profile),
        )
        .route("/api/profiles/:profile_id", delete(handlers::delete_profile))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
