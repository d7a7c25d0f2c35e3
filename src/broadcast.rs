// src/broadcast.rs
//
// Single-writer / multi-reader frame handoff across process boundaries,
// with the filesystem as the channel. The detector process continuously
// overwrites one well-known slot; any number of readers poll it. The
// writer never waits for a reader.
//
// Reader contract: validate JPEG markers before trusting the bytes, retry
// briefly on a torn read (the writer may be mid-replace on another
// filesystem without atomic rename semantics), and forward a chunk only
// when its content hash differs from the last forwarded one.

use crate::artifacts::{is_valid_jpeg, newest_jpeg, write_atomic};
use crate::types::BroadcastConfig;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace};

pub const LATEST_FRAME_NAME: &str = "latest.jpg";

// ============================================================================
// WRITER
// ============================================================================

pub struct FrameBroadcaster {
    slot: PathBuf,
}

impl FrameBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            slot: PathBuf::from(&config.frames_dir).join(LATEST_FRAME_NAME),
        }
    }

    /// Overwrite the broadcast slot with the latest encoded frame.
    /// Atomic-replace, so a reader never observes a truncated frame.
    pub fn publish(&self, jpeg: &[u8]) -> Result<()> {
        write_atomic(&self.slot, jpeg)
    }
}

// ============================================================================
// READER
// ============================================================================

pub struct BroadcastReader {
    frames_dir: PathBuf,
    config: BroadcastConfig,
    last_hash: Option<[u8; 16]>,
}

impl BroadcastReader {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            frames_dir: PathBuf::from(&config.frames_dir),
            config,
            last_hash: None,
        }
    }

    /// Interval the caller should sleep between poll ticks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// One poll tick: returns the current frame bytes if they pass the
    /// integrity check and differ from the last forwarded frame. A failed
    /// or unchanged tick returns None; the stream just skips it.
    pub fn poll(&mut self) -> Option<Vec<u8>> {
        let (path, _) = newest_jpeg(&self.frames_dir)?;
        let bytes = self.safe_read(&path)?;

        let hash: [u8; 16] = md5::compute(&bytes).into();
        if self.last_hash == Some(hash) {
            trace!("Broadcast slot unchanged, skipping tick");
            return None;
        }
        self.last_hash = Some(hash);
        Some(bytes)
    }

    /// Bounded retry around a transient torn read.
    fn safe_read(&self, path: &std::path::Path) -> Option<Vec<u8>> {
        for attempt in 0..self.config.read_retries {
            match fs::read(path) {
                Ok(bytes) if is_valid_jpeg(&bytes) => return Some(bytes),
                Ok(_) => debug!("Frame failed integrity check (attempt {})", attempt + 1),
                Err(e) => debug!("Frame read failed (attempt {}): {}", attempt + 1, e),
            }
            std::thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &std::path::Path) -> BroadcastConfig {
        BroadcastConfig {
            frames_dir: dir.to_string_lossy().into_owned(),
            jpeg_quality: 90,
            poll_interval_ms: 30,
            read_retries: 3,
            retry_delay_ms: 1,
        }
    }

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xff, 0xd8];
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&[0xff, 0xd9]);
        bytes
    }

    #[test]
    fn test_reader_sees_published_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let writer = FrameBroadcaster::new(&config);
        let mut reader = BroadcastReader::new(config);

        assert!(reader.poll().is_none()); // nothing published yet

        let frame = jpeg(b"frame-1");
        writer.publish(&frame).unwrap();
        assert_eq!(reader.poll().unwrap(), frame);
    }

    #[test]
    fn test_unchanged_frame_not_forwarded_twice() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let writer = FrameBroadcaster::new(&config);
        let mut reader = BroadcastReader::new(config);

        writer.publish(&jpeg(b"frame-1")).unwrap();
        assert!(reader.poll().is_some());
        assert!(reader.poll().is_none());
        assert!(reader.poll().is_none());

        writer.publish(&jpeg(b"frame-2")).unwrap();
        assert!(reader.poll().is_some());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let mut reader = BroadcastReader::new(config);

        // writer crashed mid-frame: SOI present, EOI missing
        fs::write(dir.path().join(LATEST_FRAME_NAME), b"\xff\xd8torn").unwrap();
        assert!(reader.poll().is_none());
    }

    #[test]
    fn test_independent_readers_each_get_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let writer = FrameBroadcaster::new(&config);
        let mut reader_a = BroadcastReader::new(config.clone());
        let mut reader_b = BroadcastReader::new(config);

        writer.publish(&jpeg(b"frame-1")).unwrap();
        assert!(reader_a.poll().is_some());
        assert!(reader_b.poll().is_some());
        assert!(reader_a.poll().is_none());
        assert!(reader_b.poll().is_none());
    }

    #[test]
    fn test_writer_overwrites_freely() {
        // No reader present at all; publishing must never block or fail
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let writer = FrameBroadcaster::new(&config);
        for i in 0..20u8 {
            writer.publish(&jpeg(&[i])).unwrap();
        }
        let mut reader = BroadcastReader::new(config);
        assert_eq!(reader.poll().unwrap(), jpeg(&[19]));
    }
}
