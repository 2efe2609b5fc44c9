use crate::camera_config::DetectorKind;
use crate::core::capture_source::Frame;
use crate::detection::pixel_ops::flame_ratio;
use crate::detection::{DetectionEvent, EventGate, RollingWindow, Severity};
use crate::detection_config::FireSettings;
use crate::errors::DetectorError;

/// Flame-colour classifier averaged over a short window of frames.
#[derive(Debug, Clone)]
pub struct FireDetector {
    settings: FireSettings,
    window: RollingWindow,
    gate: EventGate,
}

impl FireDetector {
    pub fn new(settings: FireSettings) -> Self {
        FireDetector {
            window: RollingWindow::new(settings.window_frames),
            gate: EventGate::new(settings.min_event_gap()),
            settings,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionEvent>, DetectorError> {
        if frame.is_empty() {
            return Err(DetectorError::EmptyFrame { sequence: frame.sequence });
        }
        let ratio = flame_ratio(&frame.image, self.settings.saturation_min, self.settings.value_min);
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
            DetectorKind::Fire,
            Severity::Critical,
            confidence,
            format!(
                "flame-coloured area {:.1}% over the last {} frames",
                mean * 100.0,
                self.window.capacity()
            ),
        )])
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.gate.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::Duration;
    use tokio::time::Instant;

    fn settings() -> FireSettings {
        FireSettings {
            confidence_threshold: 0.5,
            window_frames: 3,
            min_event_gap_ms: 1_000,
            ..FireSettings::default()
        }
    }

    fn burning(at: Instant, seq: u64) -> Frame {
        Frame::new("cam-9", seq, at, RgbImage::from_pixel(10, 10, Rgb([255, 110, 10])))
    }

    fn calm(at: Instant, seq: u64) -> Frame {
        Frame::new("cam-9", seq, at, RgbImage::from_pixel(10, 10, Rgb([30, 60, 140])))
    }

    #[test]
    fn needs_a_full_window_before_firing() {
        let mut det = FireDetector::new(settings());
        let t0 = Instant::now();
        assert!(det.detect(&burning(t0, 1)).unwrap().is_empty());
        assert!(det.detect(&burning(t0, 2)).unwrap().is_empty());
        let events = det.detect(&burning(t0, 3)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Critical);
        assert_eq!(events[0].confidence, 1.0);
    }

    #[test]
    fn sustained_fire_respects_min_gap() {
        let mut det = FireDetector::new(settings());
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        for i in 0..10u64 {
            let at = t0 + Duration::from_millis(200 * i);
            emitted.extend(det.detect(&burning(at, i)).unwrap());
        }
        // frames at 400ms (first full window) and 1400ms (gap elapsed)
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].occurred_at - emitted[0].occurred_at, Duration::from_millis(1_000));
    }

    #[test]
    fn ordinary_scene_stays_quiet() {
        let mut det = FireDetector::new(settings());
        let t0 = Instant::now();
        for i in 0..6 {
            assert!(det.detect(&calm(t0, i)).unwrap().is_empty());
        }
    }
}
