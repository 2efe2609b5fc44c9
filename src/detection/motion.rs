use crate::camera_config::DetectorKind;
use crate::core::capture_source::Frame;
use crate::detection::pixel_ops::{changed_ratio, to_luma, PixelRect};
use crate::detection::{DetectionEvent, Severity};
use crate::detection_config::MotionSettings;
use crate::errors::DetectorError;
use image::GrayImage;
use log::debug;

/// Frame-to-frame differencing. Never fires on the first frame of a session.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    settings: MotionSettings,
    previous: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        MotionDetector { settings, previous: None }
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionEvent>, DetectorError> {
        if frame.is_empty() {
            return Err(DetectorError::EmptyFrame { sequence: frame.sequence });
        }
        let current = to_luma(&frame.image);

        let mut events = Vec::new();
        match &self.previous {
            Some(previous) if previous.dimensions() == current.dimensions() => {
                let ratio = changed_ratio(
                    previous,
                    &current,
                    self.settings.pixel_delta_threshold,
                    PixelRect::full(frame.width(), frame.height()),
                );
                if ratio > self.settings.changed_ratio_threshold {
                    events.push(DetectionEvent::new(
                        frame,
                        DetectorKind::Motion,
                        Severity::Info,
                        ratio.min(1.0),
                        format!("{:.1}% of the frame changed", ratio * 100.0),
                    ));
                }
            }
            Some(previous) => {
                debug!(
                    "Camera [{}]: resolution changed {:?} -> {:?}, motion reference reset.",
                    frame.camera_id,
                    previous.dimensions(),
                    current.dimensions()
                );
            }
            None => {}
        }
        self.previous = Some(current);
        Ok(events)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
