// src/main.rs

mod annotate;
mod artifacts;
mod broadcast;
mod capture;
mod config;
mod detection;
mod events;
mod evidence;
mod light_state;
mod pipeline;
mod rules;
mod schedule;
mod server;
mod supervisor;
mod types;
mod yolo;

use anyhow::{Context, Result};
use capture::{StreamCapture, YtDlpResolver};
use server::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use supervisor::DetectorSupervisor;
use tracing::{error, info, warn};
use types::Config;

const CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(CONFIG_PATH)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("detect") => run_detector(config).await,
        Some("serve") | None => run_server(config).await,
        Some(other) => {
            error!("Unknown subcommand '{}' (expected 'serve' or 'detect')", other);
            std::process::exit(2);
        }
    }
}

// ============================================================================
// DETECTOR PROCESS
// ============================================================================

/// Capture + detection loop. Runs as its own OS process so the serving
/// layer can kill and restart it without touching its own state.
async fn run_detector(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.broadcast.frames_dir)
        .context("creating frames directory")?;
    std::fs::create_dir_all(&config.evidence.violations_dir)
        .context("creating violations directory")?;

    info!("🚦 Starting detector for {}", config.stream.source_url);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    // the whole loop is blocking work (OpenCV decode, ONNX inference)
    let handle = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut capture = StreamCapture::new(&config, Box::new(YtDlpResolver))?;
        capture.run(&cancel)
    });
    handle.await.context("detector task panicked")??;

    info!("Detector stopped");
    Ok(())
}

// ============================================================================
// DASHBOARD SERVER
// ============================================================================

async fn run_server(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.broadcast.frames_dir)
        .context("creating frames directory")?;
    std::fs::create_dir_all(&config.evidence.violations_dir)
        .context("creating violations directory")?;

    let supervisor = Arc::new(DetectorSupervisor::new(
        DetectorSupervisor::self_detect_command()?,
        config.broadcast.frames_dir.clone(),
        Duration::from_secs(config.supervisor.stop_timeout_secs),
    ));

    let bind = config.server.bind.clone();
    let state = AppState {
        supervisor: supervisor.clone(),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("🌐 Dashboard server listening on {}", bind);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_detector_on_shutdown(&supervisor);
    Ok(())
}

/// The detector child must not outlive the server process.
fn stop_detector_on_shutdown(supervisor: &DetectorSupervisor) {
    match supervisor.stop() {
        Ok(_) => info!("Detector stopped with the server"),
        Err(e) => warn!("Could not stop detector during shutdown: {}", e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received, draining server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor::DetectorState;

    #[test]
    fn test_shutdown_stops_running_detector() {
        let dir = tempfile::tempdir().unwrap();
        let sup = DetectorSupervisor::new(
            vec!["sleep".to_string(), "30".to_string()],
            dir.path(),
            Duration::from_secs(2),
        );
        sup.start().unwrap();
        stop_detector_on_shutdown(&sup);
        assert_eq!(sup.status(), DetectorState::Stopped);
    }
}
