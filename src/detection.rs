// src/detection.rs
//
// Detection normalizer: the seam against the external object-detection
// model. Raw {class_id, confidence, box} records come in, a canonical
// Detection list goes out; nothing else of the model's output crosses
// this boundary.

use crate::light_state::detection_light_color;
use crate::types::{Detection, Frame, Label, RawDetection};
use anyhow::Result;
use tracing::debug;

/// Boundary trait for the object-detection model, so the pipeline can run
/// against any backend.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &[u8], width: usize, height: usize) -> Result<Vec<RawDetection>>;
}

/// Filter and validate raw detector output. Records below the confidence
/// threshold or outside the monitored label set are dropped; traffic-light
/// detections get a localized color classification attached, using the
/// same pixel-count cutoff as the fixed sensor regions. Pure transform,
/// insertion order preserved.
pub fn normalize_detections(
    raw: &[RawDetection],
    frame: &Frame,
    confidence_threshold: f32,
    light_pixel_threshold: u32,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for record in raw {
        if record.confidence < confidence_threshold {
            continue;
        }
        let Some(label) = Label::from_coco_class(record.class_id) else {
            continue;
        };
        if record.bbox[0] >= record.bbox[2] || record.bbox[1] >= record.bbox[3] {
            // degenerate box from the model, nothing to evaluate
            continue;
        }

        let light_color = if label == Label::TrafficLight {
            Some(detection_light_color(
                frame,
                &record.bbox,
                light_pixel_threshold,
            ))
        } else {
            None
        };

        detections.push(Detection {
            label,
            bbox: record.bbox,
            confidence: record.confidence,
            light_color,
        });
    }

    debug!(
        "Normalized {} of {} raw detections",
        detections.len(),
        raw.len()
    );
    detections
}
