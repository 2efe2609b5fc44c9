use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DetectionConfig {
    pub motion: MotionSettings,
    pub fire: FireSettings,
    pub intrusion: IntrusionSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MotionSettings {
    pub pixel_delta_threshold: u8,    // grayscale difference counted as "changed"
    pub changed_ratio_threshold: f32, // fraction of changed pixels that triggers an event
}

impl Default for MotionSettings {
    fn default() -> Self {
        MotionSettings {
            pixel_delta_threshold: 25,
            changed_ratio_threshold: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FireSettings {
    pub confidence_threshold: f32,
    pub window_frames: usize,
    pub min_event_gap_ms: u64,
    pub saturation_min: f32,
    pub value_min: f32,
    pub full_confidence_ratio: f32, // flame-pixel ratio that maps to confidence 1.0
}

impl Default for FireSettings {
    fn default() -> Self {
        FireSettings {
            confidence_threshold: 0.4,
            window_frames: 5,
            min_event_gap_ms: 10_000,
            saturation_min: 0.4,
            value_min: 0.4,
            full_confidence_ratio: 0.05,
        }
    }
}

impl FireSettings {
    pub fn min_event_gap(&self) -> Duration {
        Duration::from_millis(self.min_event_gap_ms)
    }
}

/// Rectangle expressed as fractions of the frame size.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RelativeRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for RelativeRegion {
    fn default() -> Self {
        RelativeRegion { x: 0.25, y: 0.25, width: 0.5, height: 0.5 }
    }
}

impl RelativeRegion {
    pub fn is_valid(&self) -> bool {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        in_unit(self.x)
            && in_unit(self.y)
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct IntrusionSettings {
    pub region: RelativeRegion,
    pub pixel_delta_threshold: u8,
    pub confidence_threshold: f32,
    pub window_frames: usize,
    pub min_event_gap_ms: u64,
    pub full_confidence_ratio: f32,
}

impl Default for IntrusionSettings {
    fn default() -> Self {
        IntrusionSettings {
            region: RelativeRegion::default(),
            pixel_delta_threshold: 25,
            confidence_threshold: 0.5,
            window_frames: 5,
            min_event_gap_ms: 10_000,
            full_confidence_ratio: 0.1,
        }
    }
}

impl IntrusionSettings {
    pub fn min_event_gap(&self) -> Duration {
        Duration::from_millis(self.min_event_gap_ms)
    }
}

impl DetectionConfig {
    /// Human-readable problems with the thresholds, empty when everything is in range.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let unit = |name: &str, v: f32, problems: &mut Vec<String>| {
            if !(0.0..=1.0).contains(&v) {
                problems.push(format!("{} must be within [0, 1], got {}", name, v));
            }
        };
        unit("motion.changed_ratio_threshold", self.motion.changed_ratio_threshold, &mut problems);
        unit("fire.confidence_threshold", self.fire.confidence_threshold, &mut problems);
        unit("fire.saturation_min", self.fire.saturation_min, &mut problems);
        unit("fire.value_min", self.fire.value_min, &mut problems);
        unit("intrusion.confidence_threshold", self.intrusion.confidence_threshold, &mut problems);
        if self.fire.full_confidence_ratio <= 0.0 {
            problems.push("fire.full_confidence_ratio must be positive".to_string());
        }
        if self.intrusion.full_confidence_ratio <= 0.0 {
            problems.push("intrusion.full_confidence_ratio must be positive".to_string());
        }
        if self.fire.window_frames == 0 {
            problems.push("fire.window_frames must be at least 1".to_string());
        }
        if self.intrusion.window_frames == 0 {
            problems.push("intrusion.window_frames must be at least 1".to_string());
        }
        if !self.intrusion.region.is_valid() {
            problems.push(format!("intrusion.region {:?} must lie inside the unit square", self.intrusion.region));
        }
        problems
    }
}
