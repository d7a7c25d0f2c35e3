// src/types.rs

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub model: ModelConfig,
    pub schedule: ScheduleConfig,
    pub zone: ZoneConfig,
    pub lights: LightsConfig,
    pub direction: DirectionConfig,
    pub rules: RulesConfig,
    pub broadcast: BroadcastConfig,
    pub evidence: EvidenceConfig,
    pub supervisor: SupervisorConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub source_url: String,
    pub resolve_retry_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source_url: "https://www.youtube.com/watch?v=1EiC9bvVGnk".to_string(),
            resolve_retry_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.6,
            nms_iou_threshold: 0.45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Time-of-day bounds, "HH:MM"
    pub start: String,
    pub end: String,
    /// Camera timezone relative to UTC (the feed may not be local)
    pub utc_offset_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start: "06:00".to_string(),
            end: "23:59".to_string(),
            utc_offset_hours: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Convex intersection polygon, ordered vertices in pixel coordinates
    pub polygon: Vec<[f32; 2]>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            polygon: vec![
                [600.0, 350.0],
                [800.0, 350.0],
                [800.0, 500.0],
                [600.0, 500.0],
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LightRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightRegions {
    pub north_south: LightRegion,
    pub west_east: LightRegion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub pixel_count_threshold: u32,
    pub regions: LightRegions,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            pixel_count_threshold: 50,
            regions: LightRegions {
                north_south: LightRegion {
                    x1: 1130,
                    y1: 180,
                    x2: 1145,
                    y2: 200,
                },
                west_east: LightRegion {
                    x1: 205,
                    y1: 155,
                    x2: 220,
                    y2: 175,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    pub west_east_max_x: f32,
    pub west_east_min_y: f32,
    pub west_east_max_y: f32,
    pub north_south_min_x: f32,
    pub north_south_max_x: f32,
    pub north_south_min_y: f32,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            west_east_max_x: 700.0,
            west_east_min_y: 200.0,
            west_east_max_y: 500.0,
            north_south_min_x: 700.0,
            north_south_max_x: 1200.0,
            north_south_min_y: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStrategy {
    /// Primary predicate: light[direction] == red AND center inside zone
    DirectionZone,
    /// Alternate admissibility check: red light, inside zone, and the
    /// estimated distance below a cutoff (no direction attribution)
    ZoneDistance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub strategy: RuleStrategy,
    pub max_violation_distance_m: f32,
    pub avg_vehicle_width_m: f32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            strategy: RuleStrategy::DirectionZone,
            max_violation_distance_m: 50.0,
            avg_vehicle_width_m: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub frames_dir: String,
    pub jpeg_quality: i32,
    pub poll_interval_ms: u64,
    pub read_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            frames_dir: "frames".to_string(),
            jpeg_quality: 90,
            poll_interval_ms: 30,
            read_retries: 3,
            retry_delay_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub violations_dir: String,
    pub event_poll_secs: u64,
    pub listing_limit: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            violations_dir: "violations".to_string(),
            event_poll_secs: 1,
            listing_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub stop_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "redlight_monitor=info,ort=warn".to_string(),
        }
    }
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// One decoded frame, RGB interleaved.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub frame_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Car,
    Truck,
    TrafficLight,
}

impl Label {
    /// COCO class id → monitored label. Everything else is ignored upstream.
    pub fn from_coco_class(class_id: usize) -> Option<Self> {
        match class_id {
            2 => Some(Label::Car),
            7 => Some(Label::Truck),
            9 => Some(Label::TrafficLight),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Car => "car",
            Label::Truck => "truck",
            Label::TrafficLight => "traffic light",
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, Label::Car | Label::Truck)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightColor {
    Red,
    Green,
    Unknown,
}

impl LightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightColor::Red => "red",
            LightColor::Green => "green",
            LightColor::Unknown => "unknown",
        }
    }
}

/// Coarse traffic-flow axis a vehicle is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionId {
    NorthSouth,
    WestEast,
}

impl DirectionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionId::NorthSouth => "north_south",
            DirectionId::WestEast => "west_east",
        }
    }
}

/// Per-direction inferred signal color for the current frame. Recomputed
/// every frame, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightStatus {
    pub north_south: LightColor,
    pub west_east: LightColor,
}

impl LightStatus {
    pub fn all_unknown() -> Self {
        Self {
            north_south: LightColor::Unknown,
            west_east: LightColor::Unknown,
        }
    }

    pub fn get(&self, direction: DirectionId) -> LightColor {
        match direction {
            DirectionId::NorthSouth => self.north_south,
            DirectionId::WestEast => self.west_east,
        }
    }
}

/// Raw record from the object-detection boundary, before normalization.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
}

/// Canonical detection after filtering/validation. Immutable, scoped to one
/// frame's processing.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub label: Label,
    pub bbox: [f32; 4],
    pub confidence: f32,
    /// Present only for traffic-light detections
    pub light_color: Option<LightColor>,
}

impl Detection {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }

    pub fn box_width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub detection: Detection,
    pub frame_id: u64,
    pub timestamp: DateTime<Local>,
}
