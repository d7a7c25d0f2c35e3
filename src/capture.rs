// src/capture.rs
//
// Two-level capture retry loop, the system's sole resilience mechanism
// against upstream stream instability. Outer: resolve a playable URL,
// retrying forever on a fixed delay. Inner: decode frames and run the
// per-frame pipeline until decode fails, then fall back to re-resolution.
// Both waits are interruptible by the cancel flag.

use crate::broadcast::FrameBroadcaster;
use crate::pipeline::FrameAnalyzer;
use crate::types::{Config, Frame};
use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// STREAM RESOLUTION BOUNDARY
// ============================================================================

/// Turns a stream identifier into a directly decodable media URL. The
/// network side of this is an external collaborator.
pub trait StreamResolver: Send {
    fn resolve(&self, source_url: &str) -> Result<String>;
}

/// Resolves YouTube (and friends) via the yt-dlp executable.
pub struct YtDlpResolver;

impl StreamResolver for YtDlpResolver {
    fn resolve(&self, source_url: &str) -> Result<String> {
        let output = Command::new("yt-dlp")
            .args(["-g", "-f", "best", source_url])
            .output()
            .context("running yt-dlp")?;

        if !output.status.success() {
            bail!(
                "yt-dlp failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let url = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if url.is_empty() {
            bail!("yt-dlp returned no playable URL");
        }
        Ok(url)
    }
}

// ============================================================================
// CAPTURE LOOP
// ============================================================================

pub struct StreamCapture {
    resolver: Box<dyn StreamResolver>,
    analyzer: FrameAnalyzer,
    broadcaster: FrameBroadcaster,
    source_url: String,
    resolve_retry: Duration,
    jpeg_quality: i32,
    /// Monotonic across reconnects
    frame_id: u64,
}

impl StreamCapture {
    pub fn new(config: &Config, resolver: Box<dyn StreamResolver>) -> Result<Self> {
        Ok(Self {
            resolver,
            analyzer: FrameAnalyzer::new(config)?,
            broadcaster: FrameBroadcaster::new(&config.broadcast),
            source_url: config.stream.source_url.clone(),
            resolve_retry: Duration::from_secs(config.stream.resolve_retry_secs),
            jpeg_quality: config.broadcast.jpeg_quality,
            frame_id: 0,
        })
    }

    /// Run until cancelled. Stream loss is never terminal: failed
    /// resolution waits and retries, a broken decode re-resolves.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<()> {
        while !cancel.load(Ordering::Relaxed) {
            match self.resolver.resolve(&self.source_url) {
                Ok(stream_url) => {
                    if let Err(e) = self.process_stream(&stream_url, cancel) {
                        warn!("Stream processing ended: {}", e);
                    }
                    info!("Stream interrupted, re-resolving...");
                }
                Err(e) => {
                    warn!(
                        "Could not resolve stream: {}. Retrying in {:?}...",
                        e, self.resolve_retry
                    );
                    interruptible_sleep(self.resolve_retry, cancel);
                }
            }
        }
        info!("Capture loop cancelled");
        Ok(())
    }

    fn process_stream(&mut self, stream_url: &str, cancel: &AtomicBool) -> Result<()> {
        let mut cap = VideoCapture::from_file(stream_url, videoio::CAP_FFMPEG)?;
        if !cap.is_opened()? {
            bail!("failed to open stream");
        }
        info!("📺 Stream opened, processing frames");

        let mut bgr = Mat::default();
        while !cancel.load(Ordering::Relaxed) {
            if !cap.read(&mut bgr)? || bgr.empty() {
                // decode failure: back to the outer loop
                return Ok(());
            }

            self.frame_id += 1;

            // per-frame failures degrade to a skipped cycle, they never
            // kill the loop; only a decode failure ends it
            let frame = match self.to_frame(&bgr) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Frame {} conversion failed: {}", self.frame_id, e);
                    continue;
                }
            };
            match self.analyzer.analyze(&frame) {
                Ok(annotated) => broadcast_frame(
                    &self.broadcaster,
                    &annotated,
                    self.jpeg_quality,
                    frame.frame_id,
                ),
                Err(e) => warn!("Frame {} failed: {}", frame.frame_id, e),
            }
        }
        Ok(())
    }

    fn to_frame(&self, bgr: &Mat) -> Result<Frame> {
        let mut rgb = Mat::default();
        imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        Ok(Frame {
            data: rgb.data_bytes()?.to_vec(),
            width: bgr.cols() as usize,
            height: bgr.rows() as usize,
            frame_id: self.frame_id,
        })
    }
}

/// Encode and publish one annotated frame. A failed broadcast costs this
/// cycle only; the capture loop keeps running.
fn broadcast_frame(broadcaster: &FrameBroadcaster, mat: &Mat, jpeg_quality: i32, frame_id: u64) {
    let result = crate::annotate::encode_jpeg(mat, jpeg_quality)
        .and_then(|jpeg| broadcaster.publish(&jpeg));
    if let Err(e) = result {
        warn!("Broadcast failed for frame {}: {}", frame_id, e);
    }
}

/// Sleep in short slices so a pending retry wait can be cancelled within
/// ~250 ms instead of blocking for the full delay.
pub fn interruptible_sleep(total: Duration, cancel: &AtomicBool) {
    let slice = Duration::from_millis(250);
    let mut remaining = total;
    while remaining > Duration::ZERO && !cancel.load(Ordering::Relaxed) {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
