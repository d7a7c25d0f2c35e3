// src/supervisor.rs
//
// Lifecycle owner for the detector process. The capture+detection loop
// runs isolated from the serving layer as a child OS process; this state
// machine ({stopped, running}) is the only thing allowed to touch its
// handle. The child may also die on its own (stream loss is retried
// forever inside the loop, but crashes happen), so liveness is probed
// from the handle, never assumed from the last transition.

use crate::artifacts::clear_jpegs;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Stopped,
    Running,
}

pub struct DetectorSupervisor {
    /// argv of the detector process (the binary itself with the `detect`
    /// subcommand in production)
    command: Vec<String>,
    frames_dir: PathBuf,
    stop_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl DetectorSupervisor {
    pub fn new(command: Vec<String>, frames_dir: impl Into<PathBuf>, stop_timeout: Duration) -> Self {
        Self {
            command,
            frames_dir: frames_dir.into(),
            stop_timeout,
            child: Mutex::new(None),
        }
    }

    /// argv that re-runs this binary in detect mode.
    pub fn self_detect_command() -> Result<Vec<String>> {
        let exe = std::env::current_exe().context("resolving current executable")?;
        Ok(vec![exe.to_string_lossy().into_owned(), "detect".to_string()])
    }

    /// stopped → running. A no-op when already running.
    pub fn start(&self) -> Result<DetectorState> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| anyhow!("supervisor state poisoned"))?;

        if Self::probe(&mut guard) == DetectorState::Running {
            info!("Detector already running, start is a no-op");
            return Ok(DetectorState::Running);
        }

        let child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning detector process {:?}", self.command))?;

        info!("🚦 Detector process started (pid {})", child.id());
        *guard = Some(child);
        Ok(DetectorState::Running)
    }

    /// running → stopped. A no-op when not running. Stopping a live
    /// process purges every broadcast frame artifact so stale imagery is
    /// never served to a reader that connects afterwards.
    pub fn stop(&self) -> Result<DetectorState> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| anyhow!("supervisor state poisoned"))?;

        if Self::probe(&mut guard) == DetectorState::Stopped {
            *guard = None;
            return Ok(DetectorState::Stopped);
        }

        let Some(mut child) = guard.take() else {
            return Ok(DetectorState::Stopped);
        };
        child.kill().context("terminating detector process")?;

        // Bounded wait; after the deadline the handle is force-cleared and
        // the inconsistency is surfaced in the log.
        let deadline = Instant::now() + self.stop_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Detector process exited: {}", status);
                    break;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) => {
                    warn!(
                        "Detector process did not exit within {:?}, clearing handle anyway",
                        self.stop_timeout
                    );
                    break;
                }
                Err(e) => {
                    warn!("Could not reap detector process: {}", e);
                    break;
                }
            }
        }

        clear_jpegs(&self.frames_dir)?;
        info!("Broadcast frames cleared after stop");
        Ok(DetectorState::Stopped)
    }

    /// Pure read: does the recorded handle denote a live process?
    pub fn status(&self) -> DetectorState {
        match self.child.lock() {
            Ok(mut guard) => Self::probe(&mut guard),
            Err(_) => DetectorState::Stopped,
        }
    }

    /// Reconcile recorded state with observed liveness: a child that
    /// exited on its own is reaped and forgotten here.
    fn probe(guard: &mut Option<Child>) -> DetectorState {
        match guard.as_mut() {
            None => DetectorState::Stopped,
            Some(child) => match child.try_wait() {
                Ok(None) => DetectorState::Running,
                Ok(Some(status)) => {
                    warn!("Detector process exited on its own: {}", status);
                    *guard = None;
                    DetectorState::Stopped
                }
                Err(e) => {
                    warn!("Detector liveness probe failed: {}", e);
                    *guard = None;
                    DetectorState::Stopped
                }
            },
        }
    }
}

impl Drop for DetectorSupervisor {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper(frames_dir: &std::path::Path) -> DetectorSupervisor {
        DetectorSupervisor::new(
            vec!["sleep".to_string(), "30".to_string()],
            frames_dir,
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_stop_when_not_running_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = sleeper(dir.path());
        assert_eq!(sup.status(), DetectorState::Stopped);
        assert_eq!(sup.stop().unwrap(), DetectorState::Stopped);
        assert_eq!(sup.status(), DetectorState::Stopped);
    }

    #[test]
    fn test_start_then_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = sleeper(dir.path());
        assert_eq!(sup.start().unwrap(), DetectorState::Running);
        assert_eq!(sup.status(), DetectorState::Running);
        assert_eq!(sup.start().unwrap(), DetectorState::Running);
        sup.stop().unwrap();
    }

    #[test]
    fn test_stop_clears_broadcast_frames() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("latest.jpg"), b"stale").unwrap();
        std::fs::write(dir.path().join("older.jpg"), b"stale").unwrap();

        let sup = sleeper(dir.path());
        sup.start().unwrap();
        assert_eq!(sup.stop().unwrap(), DetectorState::Stopped);

        assert!(!dir.path().join("latest.jpg").exists());
        assert!(!dir.path().join("older.jpg").exists());
        assert_eq!(sup.status(), DetectorState::Stopped);
    }

    #[test]
    fn test_status_reflects_child_dying_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let sup = DetectorSupervisor::new(
            vec!["true".to_string()],
            dir.path(),
            Duration::from_secs(2),
        );
        sup.start().unwrap();
        // `true` exits immediately; give it a moment, then probe
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(sup.status(), DetectorState::Stopped);
    }

    #[test]
    fn test_spawn_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let sup = DetectorSupervisor::new(
            vec!["/nonexistent/detector".to_string()],
            dir.path(),
            Duration::from_secs(2),
        );
        assert!(sup.start().is_err());
        assert_eq!(sup.status(), DetectorState::Stopped);
    }
}
