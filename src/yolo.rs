// src/yolo.rs
//
// ONNX YOLO inference boundary. Everything model-specific (letterboxing,
// tensor layout, NMS) stays in here; the rest of the pipeline only sees
// RawDetection records, which the normalizer in detection.rs validates.

use crate::detection::ObjectDetector;
use crate::types::RawDetection;
use anyhow::{ensure, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CLASSES: usize = 80;
const YOLO_PREDICTIONS: usize = 8400;

// COCO class IDs the monitor cares about: car, truck, traffic light
const MONITORED_CLASSES: [usize; 3] = [2, 7, 9];

/// Loose floor applied inside postprocessing; the normalizer enforces the
/// real confidence contract downstream.
const RAW_CONFIDENCE_FLOOR: f32 = 0.25;

pub struct YoloDetector {
    session: Session,
    nms_iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(model_path: &str, nms_iou_threshold: f32) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        info!("✓ YOLO detector initialized");
        Ok(Self {
            session,
            nms_iou_threshold,
        })
    }

    fn preprocess(
        &self,
        src: &[u8],
        src_w: usize,
        src_h: usize,
    ) -> Result<(Vec<f32>, f32, f32, f32)> {
        let target_size = YOLO_INPUT_SIZE;

        // Scale to fit inside 640x640 keeping aspect ratio
        let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;

        let pad_x = (target_size - scaled_w) as f32 / 2.0;
        let pad_y = (target_size - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

        // Letterbox canvas, gray background
        let mut canvas = vec![114u8; target_size * target_size * 3];
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_x = x + pad_x as usize;
                let dst_y = y + pad_y as usize;
                let dst_idx = (dst_y * target_size + dst_x) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        // Normalize [0, 255] -> [0, 1] and convert HWC -> CHW
        let mut input = vec![0.0f32; 3 * target_size * target_size];
        for c in 0..3 {
            for h in 0..target_size {
                for w in 0..target_size {
                    let hwc_idx = (h * target_size + w) * 3 + c;
                    let chw_idx = c * target_size * target_size + h * target_size + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        Ok((input, scale, pad_x, pad_y))
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&mut self, frame: &[u8], width: usize, height: usize) -> Result<Vec<RawDetection>> {
        let (input, scale, pad_x, pad_y) = self.preprocess(frame, width, height)?;
        let output = self.infer(&input)?;
        let detections = decode_predictions(&output, scale, pad_x, pad_y, self.nms_iou_threshold)?;

        debug!("YOLO returned {} raw detections", detections.len());
        Ok(detections)
    }
}

/// Decode a YOLOv8 output tensor, expected layout [1, 84, 8400]:
/// each prediction column is [x, y, w, h, class0_conf, ..., class79_conf].
fn decode_predictions(
    output: &[f32],
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    iou_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let expected = (4 + YOLO_CLASSES) * YOLO_PREDICTIONS;
    ensure!(
        output.len() == expected,
        "model output has {} values, expected {} ([1, {}, {}])",
        output.len(),
        expected,
        4 + YOLO_CLASSES,
        YOLO_PREDICTIONS
    );

    let mut detections = Vec::new();

    for i in 0..YOLO_PREDICTIONS {
        let cx = output[i];
        let cy = output[YOLO_PREDICTIONS + i];
        let w = output[YOLO_PREDICTIONS * 2 + i];
        let h = output[YOLO_PREDICTIONS * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..YOLO_CLASSES {
            let conf = output[YOLO_PREDICTIONS * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < RAW_CONFIDENCE_FLOOR || !MONITORED_CLASSES.contains(&best_class) {
            continue;
        }

        // Center format -> corner format, then reverse the letterbox
        let x1 = (cx - w / 2.0 - pad_x) / scale;
        let y1 = (cy - h / 2.0 - pad_y) / scale;
        let x2 = (cx + w / 2.0 - pad_x) / scale;
        let y2 = (cy + h / 2.0 - pad_y) / scale;

        detections.push(RawDetection {
            bbox: [x1, y1, x2, y2],
            confidence: max_conf,
            class_id: best_class,
        });
    }

    Ok(nms(detections, iou_threshold))
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_unexpected_output_shape() {
        let err = decode_predictions(&[0.0; 64], 1.0, 0.0, 0.0, 0.45).unwrap_err();
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_decode_single_confident_box() {
        let mut output = vec![0.0f32; (4 + YOLO_CLASSES) * YOLO_PREDICTIONS];
        output[0] = 320.0; // cx
        output[YOLO_PREDICTIONS] = 320.0; // cy
        output[YOLO_PREDICTIONS * 2] = 100.0; // w
        output[YOLO_PREDICTIONS * 3] = 50.0; // h
        output[YOLO_PREDICTIONS * (4 + 2)] = 0.9; // car confidence

        let dets = decode_predictions(&output, 1.0, 0.0, 0.0, 0.45).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
        assert_eq!(dets[0].bbox, [270.0, 295.0, 370.0, 345.0]);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((calculate_iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let dets = vec![
            RawDetection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                confidence: 0.9,
                class_id: 2,
            },
            RawDetection {
                bbox: [1.0, 1.0, 11.0, 11.0],
                confidence: 0.8,
                class_id: 2,
            },
            RawDetection {
                bbox: [50.0, 50.0, 60.0, 60.0],
                confidence: 0.7,
                class_id: 7,
            },
        ];
        let kept = nms(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }
}
