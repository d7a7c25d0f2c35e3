// src/server/stream.rs
//
// Streaming endpoints backed by the filesystem channels. Each connection
// gets its own polling reader on a dedicated thread (the readers do small
// blocking file reads), bridged into the response through a tokio
// channel. A dropped connection closes the channel and the thread winds
// down on its next tick.

use crate::broadcast::BroadcastReader;
use crate::events::ViolationEventPoller;
use crate::server::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const MJPEG_BOUNDARY: &str = "frame";

/// MJPEG multipart stream of the latest annotated frame. The per-reader
/// hash dedup means an unchanged broadcast slot produces no traffic.
pub async fn video_feed(State(st): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel::<Result<Vec<u8>, Infallible>>(4);
    let config = st.config.broadcast.clone();

    std::thread::spawn(move || {
        let mut reader = BroadcastReader::new(config);
        loop {
            if tx.is_closed() {
                debug!("MJPEG client disconnected");
                break;
            }
            if let Some(jpeg) = reader.poll() {
                let mut chunk = Vec::with_capacity(jpeg.len() + 64);
                chunk.extend_from_slice(
                    format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY).as_bytes(),
                );
                chunk.extend_from_slice(&jpeg);
                chunk.extend_from_slice(b"\r\n");
                if tx.blocking_send(Ok(chunk)).is_err() {
                    break;
                }
            }
            std::thread::sleep(reader.poll_interval());
        }
    });

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
}

/// Server-sent events: one event per new evidence artifact.
pub async fn viol_stream(State(st): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let violations_dir = st.config.evidence.violations_dir.clone();
    let poll_interval = Duration::from_secs(st.config.evidence.event_poll_secs);

    std::thread::spawn(move || {
        let mut poller = ViolationEventPoller::new(violations_dir, poll_interval);
        loop {
            if tx.is_closed() {
                debug!("SSE client disconnected");
                break;
            }
            if let Some(event) = poller.poll() {
                match Event::default().json_data(&event) {
                    Ok(sse_event) => {
                        if tx.blocking_send(Ok(sse_event)).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Could not serialize violation event: {}", e),
                }
            }
            std::thread::sleep(poller.poll_interval());
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}
