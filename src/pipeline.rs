// src/pipeline.rs
//
// Per-frame orchestration: schedule gate → light classification → object
// detection → normalization → rule evaluation → evidence → annotation.
// One bad frame never kills the process; every failure path degrades to
// "return the frame as-is" or "skip this step".

use crate::annotate;
use crate::detection::{normalize_detections, ObjectDetector};
use crate::evidence::EvidenceWriter;
use crate::light_state::LightStateClassifier;
use crate::rules::RuleEngine;
use crate::schedule::OperatingWindow;
use crate::types::{Config, Frame, Violation};
use crate::yolo::YoloDetector;
use anyhow::Result;
use chrono::{Local, NaiveTime};
use opencv::core::Mat;
use tracing::{debug, warn};

pub struct FrameAnalyzer {
    window: OperatingWindow,
    classifier: LightStateClassifier,
    detector: Box<dyn ObjectDetector>,
    engine: RuleEngine,
    evidence: EvidenceWriter,
    confidence_threshold: f32,
    light_pixel_threshold: u32,
    jpeg_quality: i32,
}

impl FrameAnalyzer {
    pub fn new(config: &Config) -> Result<Self> {
        let detector = YoloDetector::new(&config.model.path, config.model.nms_iou_threshold)?;
        Self::with_detector(config, Box::new(detector))
    }

    /// Build around any detector backend (the model boundary is a trait).
    pub fn with_detector(config: &Config, detector: Box<dyn ObjectDetector>) -> Result<Self> {
        let window = OperatingWindow::from_config(&config.schedule)?;
        let classifier = LightStateClassifier::new(config.lights.clone());
        let zone = crate::rules::Zone::from_config(&config.zone)?;
        let engine = RuleEngine::new(zone, config.direction.clone(), config.rules.clone());
        let evidence = EvidenceWriter::new(&config.evidence.violations_dir);

        Ok(Self {
            window,
            classifier,
            detector,
            engine,
            evidence,
            confidence_threshold: config.model.confidence_threshold,
            light_pixel_threshold: config.lights.pixel_count_threshold,
            jpeg_quality: config.broadcast.jpeg_quality,
        })
    }

    /// Run the full pipeline on one frame and return the annotated BGR
    /// image ready for broadcast.
    pub fn analyze(&mut self, frame: &Frame) -> Result<Mat> {
        let now = self.window.local_now();
        self.analyze_at(frame, now)
    }

    /// Same pipeline with the evaluation time supplied by the caller, so
    /// the schedule gate can be driven explicitly.
    pub fn analyze_at(&mut self, frame: &Frame, now: NaiveTime) -> Result<Mat> {
        // Night-mode gate, re-checked on every frame so a window boundary
        // takes effect within one frame
        if !self.window.contains(now) {
            let mut mat = annotate::to_bgr_mat(frame)?;
            annotate::draw_disabled_marker(&mut mat)?;
            return Ok(mat);
        }

        let light_status = self.classifier.classify(frame);

        let raw = match self.detector.detect(&frame.data, frame.width, frame.height) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Detection failed on frame {}: {}", frame.frame_id, e);
                return annotate::to_bgr_mat(frame);
            }
        };
        let detections = normalize_detections(
            &raw,
            frame,
            self.confidence_threshold,
            self.light_pixel_threshold,
        );

        let mut mat = annotate::to_bgr_mat(frame)?;
        annotate::draw_light_status(&mut mat, &light_status)?;

        if detections.is_empty() {
            return Ok(mat);
        }

        let violating = self
            .engine
            .check(&detections, &light_status, frame.width as f32);

        if !violating.is_empty() {
            debug!(
                "Frame {}: {} violation(s) at {:?}",
                frame.frame_id,
                violating.len(),
                light_status
            );
            annotate::draw_violations(&mut mat, &violating)?;

            let timestamp = Local::now();
            let violations: Vec<Violation> = violating
                .into_iter()
                .map(|detection| Violation {
                    detection,
                    frame_id: frame.frame_id,
                    timestamp,
                })
                .collect();

            let jpeg = annotate::encode_jpeg(&mat, self.jpeg_quality)?;
            if let Err(e) = self.evidence.write(&jpeg, &violations) {
                warn!("Evidence write failed for frame {}: {}", frame.frame_id, e);
            }
        }

        Ok(mat)
    }
}

// ============================================================================
// TESTS
// ============================================================================
