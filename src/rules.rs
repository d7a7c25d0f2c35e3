// src/rules.rs
//
// Violation rule engine. Pure function of (detections, light status, frame
// width): no clock, no IO, no state across frames. Two selectable
// strategies share the zone-membership core:
//
//   DirectionZone (primary): attribute the vehicle to a traffic-flow axis
//     from its box center, then require that axis' light to be red while
//     the center sits inside the intersection zone.
//
//   ZoneDistance (alternate): no direction attribution; a scalar light
//     state is derived from the detected traffic lights themselves, and a
//     rough monocular distance estimate gates admissibility instead.

use crate::types::{
    Detection, DirectionConfig, DirectionId, Label, LightColor, LightStatus, RuleStrategy,
    RulesConfig, ZoneConfig,
};
use anyhow::{ensure, Result};

// ============================================================================
// ZONE GEOMETRY
// ============================================================================

/// Convex intersection polygon. Boundary points count as inside.
#[derive(Debug, Clone)]
pub struct Zone {
    vertices: Vec<[f32; 2]>,
}

impl Zone {
    pub fn from_config(config: &ZoneConfig) -> Result<Self> {
        ensure!(
            config.polygon.len() >= 3,
            "zone polygon needs at least 3 vertices"
        );
        Ok(Self {
            vertices: config.polygon.clone(),
        })
    }

    /// Convex sign test: the point is inside iff the cross products against
    /// all edges agree in sign (zero = on the boundary, which is inside).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.vertices.len();
        let mut has_pos = false;
        let mut has_neg = false;

        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let cross = (b[0] - a[0]) * (y - a[1]) - (b[1] - a[1]) * (x - a[0]);
            if cross > f32::EPSILON {
                has_pos = true;
            } else if cross < -f32::EPSILON {
                has_neg = true;
            }
        }

        !(has_pos && has_neg)
    }
}

// ============================================================================
// DIRECTION CLASSIFICATION
// ============================================================================

/// Classify a box center into a traffic-flow axis. Total: every point maps
/// to exactly one of {west_east, north_south, None}. The west_east test
/// runs first, matching the camera calibration the thresholds came from.
pub fn classify_direction(config: &DirectionConfig, cx: f32, cy: f32) -> Option<DirectionId> {
    if cx < config.west_east_max_x && cy > config.west_east_min_y && cy < config.west_east_max_y {
        Some(DirectionId::WestEast)
    } else if cx > config.north_south_min_x
        && cx < config.north_south_max_x
        && cy > config.north_south_min_y
    {
        Some(DirectionId::NorthSouth)
    } else {
        None
    }
}

// ============================================================================
// DISTANCE ESTIMATE
// ============================================================================

/// Rough monocular distance to a vehicle in meters, from the apparent box
/// width against an assumed physical vehicle width. A heuristic, not a
/// measurement; kept as a secondary signal and for the ZoneDistance
/// strategy.
pub fn estimate_distance_m(frame_width: f32, box_width: f32, avg_vehicle_width_m: f32) -> f32 {
    if box_width <= 0.0 {
        return f32::INFINITY;
    }
    (frame_width * 0.8 * avg_vehicle_width_m) / box_width
}

// ============================================================================
// RULE ENGINE
// ============================================================================

pub struct RuleEngine {
    zone: Zone,
    direction: DirectionConfig,
    rules: RulesConfig,
}

impl RuleEngine {
    pub fn new(zone: Zone, direction: DirectionConfig, rules: RulesConfig) -> Self {
        Self {
            zone,
            direction,
            rules,
        }
    }

    /// Evaluate every vehicle detection against the violation predicate.
    /// Returns the violating detections in input order.
    pub fn check(
        &self,
        detections: &[Detection],
        light_status: &LightStatus,
        frame_width: f32,
    ) -> Vec<Detection> {
        match self.rules.strategy {
            RuleStrategy::DirectionZone => self.check_direction_zone(detections, light_status),
            RuleStrategy::ZoneDistance => self.check_zone_distance(detections, frame_width),
        }
    }

    fn check_direction_zone(
        &self,
        detections: &[Detection],
        light_status: &LightStatus,
    ) -> Vec<Detection> {
        let mut violations = Vec::new();

        for det in detections {
            if !det.label.is_vehicle() {
                continue;
            }
            let (cx, cy) = det.center();

            // A vehicle that cannot be attributed to a light is exempt
            let Some(direction) = classify_direction(&self.direction, cx, cy) else {
                continue;
            };

            if light_status.get(direction) == LightColor::Red && self.zone.contains(cx, cy) {
                violations.push(det.clone());
            }
        }

        violations
    }

    fn check_zone_distance(&self, detections: &[Detection], frame_width: f32) -> Vec<Detection> {
        // Scalar light state from the detected signal heads: any green
        // traffic light means traffic is flowing, otherwise assume red.
        let scalar_light = if detections
            .iter()
            .any(|d| d.label == Label::TrafficLight && d.light_color == Some(LightColor::Green))
        {
            LightColor::Green
        } else {
            LightColor::Red
        };

        if scalar_light != LightColor::Red {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for det in detections {
            if !det.label.is_vehicle() {
                continue;
            }
            let (cx, cy) = det.center();
            if !self.zone.contains(cx, cy) {
                continue;
            }
            let distance =
                estimate_distance_m(frame_width, det.box_width(), self.rules.avg_vehicle_width_m);
            if distance < self.rules.max_violation_distance_m {
                violations.push(det.clone());
            }
        }
        violations
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RulesConfig, ZoneConfig};

    fn default_zone() -> Zone {
        Zone::from_config(&ZoneConfig::default()).unwrap()
    }

    fn engine(strategy: RuleStrategy) -> RuleEngine {
        RuleEngine::new(
            default_zone(),
            DirectionConfig::default(),
            RulesConfig {
                strategy,
                ..RulesConfig::default()
            },
        )
    }

    fn vehicle(bbox: [f32; 4]) -> Detection {
        Detection {
            label: Label::Car,
            bbox,
            confidence: 0.9,
            light_color: None,
        }
    }

    fn traffic_light(color: LightColor) -> Detection {
        Detection {
            label: Label::TrafficLight,
            bbox: [200.0, 150.0, 220.0, 180.0],
            confidence: 0.9,
            light_color: Some(color),
        }
    }

    fn status(west_east: LightColor) -> LightStatus {
        LightStatus {
            north_south: LightColor::Unknown,
            west_east,
        }
    }

    #[test]
    fn test_zone_boundary_is_inside() {
        let zone = default_zone();
        assert!(zone.contains(700.0, 425.0)); // interior
        assert!(zone.contains(600.0, 350.0)); // vertex
        assert!(zone.contains(700.0, 350.0)); // edge
        assert!(!zone.contains(599.0, 425.0));
        assert!(!zone.contains(700.0, 501.0));
    }

    #[test]
    fn test_direction_classification_is_total() {
        let cfg = DirectionConfig::default();
        assert_eq!(
            classify_direction(&cfg, 675.0, 425.0),
            Some(DirectionId::WestEast)
        );
        assert_eq!(
            classify_direction(&cfg, 900.0, 400.0),
            Some(DirectionId::NorthSouth)
        );
        // above both bands
        assert_eq!(classify_direction(&cfg, 675.0, 100.0), None);
        // right of the north_south corridor
        assert_eq!(classify_direction(&cfg, 1300.0, 400.0), None);
    }

    #[test]
    fn test_red_light_in_zone_is_violation() {
        // box center (675, 425): inside zone, classifies west_east
        let detections = vec![vehicle([650.0, 400.0, 700.0, 450.0])];
        let v = engine(RuleStrategy::DirectionZone).check(
            &detections,
            &status(LightColor::Red),
            1280.0,
        );
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_green_light_same_box_is_not() {
        let detections = vec![vehicle([650.0, 400.0, 700.0, 450.0])];
        let v = engine(RuleStrategy::DirectionZone).check(
            &detections,
            &status(LightColor::Green),
            1280.0,
        );
        assert!(v.is_empty());
    }

    #[test]
    fn test_unknown_light_is_not_a_violation() {
        let detections = vec![vehicle([650.0, 400.0, 700.0, 450.0])];
        let v = engine(RuleStrategy::DirectionZone).check(
            &detections,
            &status(LightColor::Unknown),
            1280.0,
        );
        assert!(v.is_empty());
    }

    #[test]
    fn test_outside_zone_never_violates() {
        // center (300, 400): west_east direction but far from the zone
        let detections = vec![vehicle([275.0, 375.0, 325.0, 425.0])];
        for light in [LightColor::Red, LightColor::Green, LightColor::Unknown] {
            let v = engine(RuleStrategy::DirectionZone).check(&detections, &status(light), 1280.0);
            assert!(v.is_empty());
        }
    }

    #[test]
    fn test_unknown_direction_is_exempt() {
        // center (675, 100): inside no direction band; put zone light red
        let detections = vec![vehicle([650.0, 75.0, 700.0, 125.0])];
        let all_red = LightStatus {
            north_south: LightColor::Red,
            west_east: LightColor::Red,
        };
        let v = engine(RuleStrategy::DirectionZone).check(&detections, &all_red, 1280.0);
        assert!(v.is_empty());
    }

    #[test]
    fn test_traffic_lights_never_violate() {
        let detections = vec![traffic_light(LightColor::Red)];
        let all_red = LightStatus {
            north_south: LightColor::Red,
            west_east: LightColor::Red,
        };
        let v = engine(RuleStrategy::DirectionZone).check(&detections, &all_red, 1280.0);
        assert!(v.is_empty());
    }

    #[test]
    fn test_violations_keep_detection_order() {
        let detections = vec![
            vehicle([650.0, 400.0, 700.0, 450.0]),
            vehicle([610.0, 360.0, 790.0, 490.0]),
        ];
        let v = engine(RuleStrategy::DirectionZone).check(
            &detections,
            &status(LightColor::Red),
            1280.0,
        );
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].bbox, detections[0].bbox);
        assert_eq!(v[1].bbox, detections[1].bbox);
    }

    #[test]
    fn test_distance_estimate() {
        // 1280 * 0.8 * 2.5 / 64 = 40 m
        let d = estimate_distance_m(1280.0, 64.0, 2.5);
        assert!((d - 40.0).abs() < 1e-3);
        assert!(estimate_distance_m(1280.0, 0.0, 2.5).is_infinite());
    }

    #[test]
    fn test_zone_distance_strategy_gates_on_distance() {
        // Near vehicle: 80 px wide -> 32 m < 50 m cutoff
        let near = vehicle([630.0, 400.0, 710.0, 450.0]);
        // Far vehicle: 40 px wide -> 64 m, in zone but too far to attribute
        let far = vehicle([660.0, 400.0, 700.0, 440.0]);
        let v = engine(RuleStrategy::ZoneDistance).check(
            &[near.clone(), far],
            &LightStatus::all_unknown(),
            1280.0,
        );
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].bbox, near.bbox);
    }

    #[test]
    fn test_zone_distance_strategy_respects_green_head() {
        let near = vehicle([630.0, 400.0, 710.0, 450.0]);
        let v = engine(RuleStrategy::ZoneDistance).check(
            &[near, traffic_light(LightColor::Green)],
            &LightStatus::all_unknown(),
            1280.0,
        );
        assert!(v.is_empty());
    }
}
