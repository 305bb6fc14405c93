//! HTTP health side-channel — spec §6. Deliberately tiny: a liveness
//! probe (`GET /`) and a status probe (`GET /health`) that reports the
//! current room count, mirroring what a container orchestrator's
//! readiness check expects from the original Flask endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use overlay_core::model::now_unix_ms;
use serde::Serialize;
use std::sync::Arc;

/// Shape mirrors `original_source/server.py`'s `/health` (`status`,
/// `rooms`->`room_count`, `timestamp`), with `uptime_secs`/`public_ip`
/// added since spec §6 only requires "at least" those three fields.
#[derive(Serialize)]
struct Health {
    status: &'static str,
    room_count: usize,
    timestamp: u64,
    uptime_secs: u64,
    public_ip: String,
}

async fn root() -> &'static str {
    "overlay rendezvous server\n"
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let room_count = state.registry.lock().await.room_count();
    Json(Health {
        status: "ok",
        room_count,
        timestamp: now_unix_ms(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        public_ip: state.public_ip.clone(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
}
