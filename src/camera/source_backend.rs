use crate::app_config::ApplicationConfig;
use crate::camera::local_device::LocalDeviceSource;
use crate::camera::network_stream::NetworkStreamSource;
use crate::camera::video_decoder::{default_decoder, VideoDecoder};
use crate::camera_config::{CameraConfig, SourceKind};
use crate::core::capture_source::{FrameStream, SourceBackend};
use crate::errors::SourceError;
use async_trait::async_trait;
use std::sync::Arc;

/// Routes each camera to the source matching its kind.
#[derive(Clone)]
pub struct CameraSourceBackend {
    local: LocalDeviceSource,
    network: NetworkStreamSource,
}

impl CameraSourceBackend {
    pub fn new(decoder: Arc<dyn VideoDecoder>, settings: &ApplicationConfig) -> Self {
        CameraSourceBackend {
            local: LocalDeviceSource::new(Arc::clone(&decoder), settings.frame_interval(), settings.connect_timeout()),
            network: NetworkStreamSource::new(decoder, settings.frame_interval(), settings.connect_timeout()),
        }
    }

    pub fn with_default_decoder(settings: &ApplicationConfig) -> Self {
        Self::new(default_decoder(), settings)
    }
}

#[async_trait]
impl SourceBackend for CameraSourceBackend {
    async fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameStream>, SourceError> {
        match camera.source_kind {
            SourceKind::Local => self.local.open(camera).await,
            SourceKind::Rtsp | SourceKind::Rtmp => self.network.open(camera).await,
        }
    }
}
