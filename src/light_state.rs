// src/light_state.rs
//
// HSV-based traffic-light color classification.
//
// Two call sites share the hue-band counting core:
//   - fixed per-direction sensor regions (the signal heads the camera can
//     always see), giving the per-frame LightStatus
//   - the bounding box of a detected traffic light, attaching a color to
//     the detection itself
//
// Counting pixels against a band threshold instead of sampling single
// pixels keeps the classifier stable under LED flicker and compression
// noise in the live feed.

use crate::types::{Frame, LightColor, LightRegion, LightStatus, LightsConfig};

// ============================================================================
// HSV CONVERSION
// ============================================================================

/// Convert RGB to HSV.
/// Returns (H: 0-360, S: 0-100, V: 0-255).
#[inline]
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r_n = r / 255.0;
    let g_n = g / 255.0;
    let b_n = b / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;

    let h = if delta < 1e-6 {
        0.0
    } else if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta) % 6.0)
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    let s = if max < 1e-6 { 0.0 } else { (delta / max) * 100.0 };
    let v = max * 255.0;

    (h, s, v)
}

// ============================================================================
// HUE BANDS
// ============================================================================

/// One inclusive hue interval with saturation/value floors.
#[derive(Debug, Clone, Copy)]
struct HueBand {
    h_lo: f32,
    h_hi: f32,
    s_min: f32,
    v_min: f32,
}

impl HueBand {
    #[inline]
    fn matches(&self, h: f32, s: f32, v: f32) -> bool {
        h >= self.h_lo && h <= self.h_hi && s >= self.s_min && v >= self.v_min
    }
}

// Sensor-region bands (narrow, signal heads are small and saturated)
const REGION_RED: [HueBand; 1] = [HueBand {
    h_lo: 0.0,
    h_hi: 20.0,
    s_min: 27.0,
    v_min: 50.0,
}];
const REGION_GREEN: [HueBand; 1] = [HueBand {
    h_lo: 90.0,
    h_hi: 150.0,
    s_min: 39.0,
    v_min: 50.0,
}];

// Detection-box bands. Red gets a second band near 360° because hue space
// is circular and red LEDs land on both sides of the discontinuity.
const DETECTION_RED: [HueBand; 2] = [
    HueBand {
        h_lo: 0.0,
        h_hi: 20.0,
        s_min: 27.0,
        v_min: 50.0,
    },
    HueBand {
        h_lo: 340.0,
        h_hi: 360.0,
        s_min: 27.0,
        v_min: 50.0,
    },
];
const DETECTION_GREEN: [HueBand; 1] = [HueBand {
    h_lo: 80.0,
    h_hi: 180.0,
    s_min: 15.0,
    v_min: 40.0,
}];

/// Count pixels of `frame` inside the clamped rect that fall into any of
/// the given bands. A degenerate rect counts zero pixels.
fn count_band_pixels(
    frame: &Frame,
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
    bands: &[HueBand],
) -> u32 {
    let x2 = x2.min(frame.width);
    let y2 = y2.min(frame.height);
    if x1 >= x2 || y1 >= y2 {
        return 0;
    }

    let mut count = 0u32;
    for y in y1..y2 {
        for x in x1..x2 {
            let idx = (y * frame.width + x) * 3;
            if idx + 2 >= frame.data.len() {
                continue;
            }
            let (h, s, v) = rgb_to_hsv(
                frame.data[idx] as f32,
                frame.data[idx + 1] as f32,
                frame.data[idx + 2] as f32,
            );
            if bands.iter().any(|b| b.matches(h, s, v)) {
                count += 1;
            }
        }
    }
    count
}

// ============================================================================
// CLASSIFIERS
// ============================================================================

/// Maps a frame to a per-direction light status from the fixed sensor
/// regions. Stateless; nothing is carried across frames.
pub struct LightStateClassifier {
    config: LightsConfig,
}

impl LightStateClassifier {
    pub fn new(config: LightsConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, frame: &Frame) -> LightStatus {
        LightStatus {
            north_south: self.classify_region(frame, &self.config.regions.north_south),
            west_east: self.classify_region(frame, &self.config.regions.west_east),
        }
    }

    /// Green has priority over red: a green head lights up while the red
    /// head may still glow from bleed, so green evidence wins.
    fn classify_region(&self, frame: &Frame, region: &LightRegion) -> LightColor {
        let (x1, y1) = (region.x1 as usize, region.y1 as usize);
        let (x2, y2) = (region.x2 as usize, region.y2 as usize);

        let green = count_band_pixels(frame, x1, y1, x2, y2, &REGION_GREEN);
        if green > self.config.pixel_count_threshold {
            return LightColor::Green;
        }
        let red = count_band_pixels(frame, x1, y1, x2, y2, &REGION_RED);
        if red > self.config.pixel_count_threshold {
            return LightColor::Red;
        }
        LightColor::Unknown
    }
}

/// Color of a *detected* traffic light, scoped to its own bounding box.
/// Here red has priority: the wraparound band makes red evidence reliable
/// and a red signal is the safety-relevant answer.
pub fn detection_light_color(frame: &Frame, bbox: &[f32; 4], pixel_count_threshold: u32) -> LightColor {
    let x1 = bbox[0].max(0.0) as usize;
    let y1 = bbox[1].max(0.0) as usize;
    let x2 = bbox[2].max(0.0) as usize;
    let y2 = bbox[3].max(0.0) as usize;

    let red = count_band_pixels(frame, x1, y1, x2, y2, &DETECTION_RED);
    if red > pixel_count_threshold {
        return LightColor::Red;
    }
    let green = count_band_pixels(frame, x1, y1, x2, y2, &DETECTION_GREEN);
    if green > pixel_count_threshold {
        return LightColor::Green;
    }
    LightColor::Unknown
}

// ============================================================================
// TESTS
// ============================================================================
