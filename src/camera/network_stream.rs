use crate::camera::open_gate::{GatedOpenError, OpenGate};
use crate::camera::threaded_reader::{SourceOrigin, ThreadedFrameStream};
use crate::camera::video_decoder::VideoDecoder;
use crate::camera_config::CameraConfig;
use crate::core::capture_source::FrameStream;
use crate::errors::{ConfigurationError, SourceError};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An RTSP or RTMP stream. Retries live in the pipeline; this makes one attempt.
#[derive(Clone)]
pub struct NetworkStreamSource {
    decoder: Arc<dyn VideoDecoder>,
    frame_interval: Duration,
    connect_timeout: Duration,
    gate: OpenGate,
}

impl NetworkStreamSource {
    pub fn new(decoder: Arc<dyn VideoDecoder>, frame_interval: Duration, connect_timeout: Duration) -> Self {
        NetworkStreamSource { decoder, frame_interval, connect_timeout, gate: OpenGate::new() }
    }

    pub async fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameStream>, SourceError> {
        // Validate before touching the network.
        camera.validate().map_err(|e| match e {
            ConfigurationError::InvalidAddress { .. } | ConfigurationError::UnsupportedScheme { .. } => {
                SourceError::InvalidAddress(e.to_string())
            }
            other => SourceError::Misconfigured(other),
        })?;
        let url = camera.source_address.trim().to_string();

        debug!("Camera [{}]: connecting to {} stream via {} decoder.", camera.id, camera.source_kind, self.decoder.name());
        let connect_start = Instant::now();

        let decoder = Arc::clone(&self.decoder);
        let task_url = url.clone();
        let grabber = match self.gate.open(&url, self.connect_timeout, move || decoder.open_url(&task_url)).await {
            Ok(grabber) => grabber,
            Err(GatedOpenError::TimedOut) => {
                warn!("⚠️ Camera [{}]: connection attempt timed out after {:?}", camera.id, self.connect_timeout);
                return Err(SourceError::ConnectFailed {
                    address: url,
                    details: format!("no answer within {:?}", self.connect_timeout),
                });
            }
            Err(GatedOpenError::Refused(details)) => return Err(SourceError::ConnectFailed { address: url, details }),
        };

        let stream = ThreadedFrameStream::spawn(&camera.id, SourceOrigin::Url(url.clone()), grabber, self.frame_interval)
            .map_err(|e| SourceError::ConnectFailed {
                address: url.clone(),
                details: format!("failed to spawn capture thread: {}", e),
            })?;
        info!("🌐 Camera [{}]: {} stream connected in {:?}", camera.id, camera.source_kind, connect_start.elapsed());
        Ok(Box::new(stream))
    }
}
