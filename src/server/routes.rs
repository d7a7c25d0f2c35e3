// src/server/routes.rs
//
// JSON API: supervisor control plus evidence queries. These handlers only
// consume the core channels as data; all state lives in the supervisor
// and on disk.

use crate::evidence::{daily_counts, list_recent};
use crate::server::state::AppState;
use crate::supervisor::DetectorState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use tracing::error;

pub async fn detector_status(State(st): State<AppState>) -> impl IntoResponse {
    Json(json!({ "running": st.supervisor.status() == DetectorState::Running }))
}

pub async fn detector_toggle(State(st): State<AppState>) -> impl IntoResponse {
    let result = if st.supervisor.status() == DetectorState::Running {
        st.supervisor.stop()
    } else {
        st.supervisor.start()
    };
    respond_with_state(result)
}

pub async fn detector_start(State(st): State<AppState>) -> impl IntoResponse {
    respond_with_state(st.supervisor.start())
}

pub async fn detector_stop(State(st): State<AppState>) -> impl IntoResponse {
    respond_with_state(st.supervisor.stop())
}

fn respond_with_state(result: anyhow::Result<DetectorState>) -> axum::response::Response {
    match result {
        Ok(state) => {
            Json(json!({ "running": state == DetectorState::Running })).into_response()
        }
        Err(e) => {
            error!("Supervisor operation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn list_violations(State(st): State<AppState>) -> impl IntoResponse {
    let dir = PathBuf::from(&st.config.evidence.violations_dir);
    Json(list_recent(&dir, st.config.evidence.listing_limit))
}

pub async fn violations_stats(State(st): State<AppState>) -> impl IntoResponse {
    let dir = PathBuf::from(&st.config.evidence.violations_dir);
    Json(daily_counts(&dir))
}

pub async fn violation_img(
    State(st): State<AppState>,
    Path(fname): Path<String>,
) -> impl IntoResponse {
    // evidence keys are flat file names; anything else is not ours to serve
    if fname.contains('/') || fname.contains("..") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let path = PathBuf::from(&st.config.evidence.violations_dir).join(&fname);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
