pub mod fire;
pub mod intrusion;
pub mod motion;
pub mod pixel_ops;

use crate::camera_config::{CameraConfig, DetectorKind};
use crate::core::capture_source::Frame;
use crate::detection_config::DetectionConfig;
use crate::errors::DetectorError;
use fire::FireDetector;
use intrusion::IntrusionDetector;
use log::{debug, warn};
use motion::MotionDetector;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single detector's positive signal on one frame. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub camera_id: String,
    pub detector: DetectorKind,
    pub occurred_at: Instant,
    pub severity: Severity,
    pub confidence: f32,
    pub details: String,
}

impl DetectionEvent {
    pub fn new(frame: &Frame, detector: DetectorKind, severity: Severity, confidence: f32, details: String) -> Self {
        DetectionEvent {
            camera_id: frame.camera_id.clone(),
            detector,
            occurred_at: frame.captured_at,
            severity,
            confidence,
            details,
        }
    }
}

/// Fixed-size window of per-frame scores.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingWindow { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, sample: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean of the samples, only once the window has filled up.
    pub fn full_mean(&self) -> Option<f32> {
        if self.samples.len() < self.capacity {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.capacity as f32)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Minimum spacing between emitted events for one camera+detector.
#[derive(Debug, Clone)]
pub struct EventGate {
    min_gap: Duration,
    last_emitted: Option<Instant>,
}

impl EventGate {
    pub fn new(min_gap: Duration) -> Self {
        EventGate { min_gap, last_emitted: None }
    }

    pub fn try_pass(&mut self, at: Instant) -> bool {
        let open = self
            .last_emitted
            .map_or(true, |last| at.saturating_duration_since(last) >= self.min_gap);
        if open {
            self.last_emitted = Some(at);
        }
        open
    }

    pub fn reset(&mut self) {
        self.last_emitted = None;
    }
}

/// Closed set of detectors, each carrying its own private state.
#[derive(Debug, Clone)]
pub enum Detector {
    Motion(MotionDetector),
    Fire(FireDetector),
    Intrusion(IntrusionDetector),
}

impl Detector {
    pub fn new(kind: DetectorKind, config: &DetectionConfig) -> Self {
        match kind {
            DetectorKind::Motion => Detector::Motion(MotionDetector::new(config.motion.clone())),
            DetectorKind::Fire => Detector::Fire(FireDetector::new(config.fire.clone())),
            DetectorKind::Intrusion => Detector::Intrusion(IntrusionDetector::new(config.intrusion.clone())),
        }
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Motion(_) => DetectorKind::Motion,
            Detector::Fire(_) => DetectorKind::Fire,
            Detector::Intrusion(_) => DetectorKind::Intrusion,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionEvent>, DetectorError> {
        match self {
            Detector::Motion(d) => d.detect(frame),
            Detector::Fire(d) => d.detect(frame),
            Detector::Intrusion(d) => d.detect(frame),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Detector::Motion(d) => d.reset(),
            Detector::Fire(d) => d.reset(),
            Detector::Intrusion(d) => d.reset(),
        }
    }
}

/// The detectors of one camera. Owned by that camera's pipeline and never shared.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    camera_id: String,
    detectors: Vec<Detector>,
    skipped_frames: u64,
}

impl DetectionEngine {
    pub fn for_camera(camera: &CameraConfig, config: &DetectionConfig) -> Self {
        DetectionEngine {
            camera_id: camera.id.clone(),
            detectors: camera.detectors.iter().map(|kind| Detector::new(*kind, config)).collect(),
            skipped_frames: 0,
        }
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(Detector::kind).collect()
    }

    /// Runs every detector on the frame. A failing detector loses this frame
    /// only; the others still run.
    pub fn process(&mut self, frame: &Frame) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        for detector in self.detectors.iter_mut() {
            match detector.detect(frame) {
                Ok(found) => events.extend(found),
                Err(e) => {
                    self.skipped_frames += 1;
                    warn!(
                        "⚠️ Camera [{}]: {} detector skipped frame {}: {}",
                        self.camera_id,
                        detector.kind(),
                        frame.sequence,
                        e
                    );
                }
            }
        }
        if !events.is_empty() {
            debug!("Camera [{}]: frame {} produced {} event(s).", self.camera_id, frame.sequence, events.len());
        }
        events
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// Drops all rolling state, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.detectors.iter_mut().for_each(Detector::reset);
    }
}
