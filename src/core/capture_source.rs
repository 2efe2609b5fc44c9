use crate::camera_config::CameraConfig;
use crate::errors::SourceError;
use async_trait::async_trait;
use image::RgbImage;
use std::time::Duration;
use tokio::time::Instant;

// --- Data structures for frame information ---

/// One decoded frame. The pipeline owns it until it is lent to the detectors,
/// and it is dropped at the end of the tick.
#[derive(Debug)]
pub struct Frame {
    pub camera_id: String,
    pub sequence: u64,
    pub captured_at: Instant,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(camera_id: &str, sequence: u64, captured_at: Instant, image: RgbImage) -> Self {
        Frame {
            camera_id: camera_id.to_string(),
            sequence,
            captured_at,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

// --- The source traits ---

/// An open source handle producing frames in capture order.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits at most `wait` for the next frame. `Ok(None)` means nothing arrived
    /// in time, which lets the caller check for shutdown and liveness.
    async fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError>;

    /// Releases the underlying device or connection. Calling it twice is harmless.
    async fn close(&mut self);

    fn describe(&self) -> String;
}

/// Opens frame streams for configured cameras.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    async fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameStream>, SourceError>;
}
