use crate::camera::open_gate::{GatedOpenError, OpenGate};
use crate::camera::threaded_reader::{SourceOrigin, ThreadedFrameStream};
use crate::camera::video_decoder::VideoDecoder;
use crate::camera_config::CameraConfig;
use crate::core::capture_source::FrameStream;
use crate::errors::SourceError;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A camera attached to this machine, addressed by device index.
#[derive(Clone)]
pub struct LocalDeviceSource {
    decoder: Arc<dyn VideoDecoder>,
    frame_interval: Duration,
    open_timeout: Duration,
    gate: OpenGate,
}

impl LocalDeviceSource {
    pub fn new(decoder: Arc<dyn VideoDecoder>, frame_interval: Duration, open_timeout: Duration) -> Self {
        LocalDeviceSource { decoder, frame_interval, open_timeout, gate: OpenGate::new() }
    }

    pub async fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameStream>, SourceError> {
        let index = camera.device_index()?;
        debug!("Camera [{}]: claiming local device {} via {} decoder.", camera.id, index, self.decoder.name());
        let open_start = Instant::now();

        let decoder = Arc::clone(&self.decoder);
        let key = format!("device:{}", index);
        let grabber = match self.gate.open(&key, self.open_timeout, move || decoder.open_device(index)).await {
            Ok(grabber) => grabber,
            Err(GatedOpenError::TimedOut) => {
                return Err(SourceError::DeviceUnavailable {
                    index,
                    details: format!("device did not open within {:?}", self.open_timeout),
                })
            }
            Err(GatedOpenError::Refused(details)) => {
                error!("❌ Camera [{}]: local device {} unavailable: {}", camera.id, index, details);
                return Err(SourceError::DeviceUnavailable { index, details });
            }
        };

        let stream = ThreadedFrameStream::spawn(&camera.id, SourceOrigin::Device(index), grabber, self.frame_interval)
            .map_err(|e| SourceError::DeviceUnavailable {
                index,
                details: format!("failed to spawn capture thread: {}", e),
            })?;
        info!("📷 Camera [{}]: local device {} opened in {:?}", camera.id, index, open_start.elapsed());
        Ok(Box::new(stream))
    }
}
