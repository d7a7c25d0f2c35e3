// src/events.rs
//
// Violation event channel: a low-frequency poll over the evidence
// directory's newest artifact. One event per distinct modification time,
// carrying the artifact's name and a human timestamp. Idles when no
// evidence exists yet.

use crate::artifacts::newest_jpeg;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub file: String,
    pub ts: String,
}

pub struct ViolationEventPoller {
    violations_dir: PathBuf,
    poll_interval: Duration,
    last_mtime: Option<SystemTime>,
}

impl ViolationEventPoller {
    pub fn new(violations_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            violations_dir: violations_dir.into(),
            poll_interval,
            last_mtime: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// One poll tick: emits an event iff the newest artifact's mtime moved
    /// since the previous tick.
    pub fn poll(&mut self) -> Option<ViolationEvent> {
        let (path, mtime) = newest_jpeg(&self.violations_dir)?;
        if self.last_mtime == Some(mtime) {
            return None;
        }
        self.last_mtime = Some(mtime);

        Some(ViolationEvent {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ts: DateTime::<Local>::from(mtime)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_idle_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut poller = ViolationEventPoller::new(dir.path(), Duration::from_secs(1));
        assert!(poller.poll().is_none());
        assert!(poller.poll().is_none());
    }

    #[test]
    fn test_one_event_per_modification() {
        let dir = tempfile::tempdir().unwrap();
        let mut poller = ViolationEventPoller::new(dir.path(), Duration::from_secs(1));

        fs::write(dir.path().join("violation_1_x.jpg"), b"a").unwrap();
        let event = poller.poll().unwrap();
        assert_eq!(event.file, "violation_1_x.jpg");

        // same artifact, same mtime: no duplicate notification
        assert!(poller.poll().is_none());

        std::thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("violation_2_y.jpg"), b"b").unwrap();
        let event = poller.poll().unwrap();
        assert_eq!(event.file, "violation_2_y.jpg");
        assert!(poller.poll().is_none());
    }
}
