// src/server/mod.rs

pub mod routes;
pub mod state;
pub mod stream;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video_feed", get(stream::video_feed))
        .route("/viol_stream", get(stream::viol_stream))
        .route("/api/detector_status", get(routes::detector_status))
        .route("/api/detector_toggle", post(routes::detector_toggle))
        .route("/api/detector/start", post(routes::detector_start))
        .route("/api/detector/stop", post(routes::detector_stop))
        .route("/api/violations", get(routes::list_violations))
        .route("/api/violations_stats", get(routes::violations_stats))
        .route("/violation_img/:fname", get(routes::violation_img))
        .with_state(state)
}
