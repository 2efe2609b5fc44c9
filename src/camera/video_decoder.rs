use image::RgbImage;

/// A blocking, decoder-specific frame reader. It lives on its own thread, so
/// implementations may block inside `grab`.
pub trait FrameGrabber: Send {
    /// `Ok(None)` means the decoder had no frame this time (transient).
    /// `Err` means the device or stream is gone.
    fn grab(&mut self) -> Result<Option<RgbImage>, String>;

    fn release(&mut self);
}

/// Opens grabbers for local devices and stream URLs.
pub trait VideoDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn open_device(&self, index: u32) -> Result<Box<dyn FrameGrabber>, String>;

    fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>, String>;
}

/// Stand-in used when the crate is built without a decoding backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDecoder;

impl VideoDecoder for UnavailableDecoder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn FrameGrabber>, String> {
        Err(format!(
            "cannot open device {}: built without a video decoder (enable the `opencv` feature)",
            index
        ))
    }

    fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>, String> {
        Err(format!(
            "cannot open '{}': built without a video decoder (enable the `opencv` feature)",
            url
        ))
    }
}

#[cfg(feature = "opencv")]
pub fn default_decoder() -> std::sync::Arc<dyn VideoDecoder> {
    std::sync::Arc::new(crate::camera::opencv_decoder::OpenCvDecoder::default())
}

#[cfg(not(feature = "opencv"))]
pub fn default_decoder() -> std::sync::Arc<dyn VideoDecoder> {
    std::sync::Arc::new(UnavailableDecoder)
}
