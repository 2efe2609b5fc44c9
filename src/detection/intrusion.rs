use crate::camera_config::DetectorKind;
use crate::core::capture_source::Frame;
use crate::detection::pixel_ops::{changed_ratio, to_luma, PixelRect};
use crate::detection::{DetectionEvent, EventGate, RollingWindow, Severity};
use crate::detection_config::IntrusionSettings;
use crate::errors::DetectorError;
use image::GrayImage;

/// Sustained movement inside the protected region.
///
/// Keeps its own reference frame; it never reads the motion detector's state.
#[derive(Debug, Clone)]
pub struct IntrusionDetector {
    settings: IntrusionSettings,
    previous: Option<GrayImage>,
    window: RollingWindow,
    gate: EventGate,
}

impl IntrusionDetector {
    pub fn new(settings: IntrusionSettings) -> Self {
        IntrusionDetector {
            previous: None,
            window: RollingWindow::new(settings.window_frames),
            gate: EventGate::new(settings.min_event_gap()),
            settings,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionEvent>, DetectorError> {
        if frame.is_empty() {
            return Err(DetectorError::EmptyFrame { sequence: frame.sequence });
        }
        let rect = PixelRect::from_relative(&self.settings.region, frame.width(), frame.height())?;
        let current = to_luma(&frame.image);

        let previous = self.previous.replace(current);
        let (Some(previous), Some(current)) = (previous, self.previous.as_ref()) else {
            return Ok(Vec::new());
        };
        if previous.dimensions() != current.dimensions() {
            self.window.clear();
            return Ok(Vec::new());
        }

        let ratio = changed_ratio(&previous, current, self.settings.pixel_delta_threshold, rect);
        self.window.push(ratio);

        let Some(mean) = self.window.full_mean() else {
            return Ok(Vec::new());
        };
        let confidence = (mean / self.settings.full_confidence_ratio).min(1.0);
        if confidence < self.settings.confidence_threshold || !self.gate.try_pass(frame.captured_at) {
            return Ok(Vec::new());
        }
        Ok(vec![DetectionEvent::new(
            frame,
            DetectorKind::Intrusion,
            Severity::Warning,
            confidence,
            format!(
                "movement in protected region ({}x{} at {},{}) averaging {:.1}%",
                rect.x1 - rect.x0,
                rect.y1 - rect.y0,
                rect.x0,
                rect.y0,
                mean * 100.0
            ),
        )])
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.window.clear();
        self.gate.reset();
    }
}
