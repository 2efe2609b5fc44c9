use crate::camera::video_decoder::{FrameGrabber, VideoDecoder};
use image::RgbImage;
use log::{debug, info};
use opencv::{core as opencv_core, imgproc, prelude::*, videoio};

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvDecoder;

impl OpenCvDecoder {
    fn finish_open(mut cap: videoio::VideoCapture, what: &str) -> Result<Box<dyn FrameGrabber>, String> {
        let opened = videoio::VideoCapture::is_opened(&cap)
            .map_err(|e| format!("OpenCV: failed to check whether {} is opened: {}", what, e))?;
        if !opened {
            return Err(format!("OpenCV: failed to open {} - check availability and address", what));
        }
        // Keep latency low: only the newest frame matters for detection.
        if let Err(e) = cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0) {
            debug!("OpenCV: could not set buffer size for {}: {}", what, e);
        }
        info!("👍 OpenCV capture opened for {}", what);
        Ok(Box::new(OpenCvGrabber { cap, mat: opencv_core::Mat::default() }))
    }
}

impl VideoDecoder for OpenCvDecoder {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn FrameGrabber>, String> {
        let cap = videoio::VideoCapture::new(index as i32, videoio::CAP_ANY)
            .map_err(|e| format!("OpenCV: cannot create capture for device {}: {}", index, e))?;
        Self::finish_open(cap, &format!("device {}", index))
    }

    fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>, String> {
        let cap = videoio::VideoCapture::from_file(url, videoio::CAP_ANY)
            .map_err(|e| format!("OpenCV: cannot create capture for '{}': {}", url, e))?;
        Self::finish_open(cap, &format!("'{}'", url))
    }
}

struct OpenCvGrabber {
    cap: videoio::VideoCapture,
    mat: opencv_core::Mat,
}

impl FrameGrabber for OpenCvGrabber {
    fn grab(&mut self) -> Result<Option<RgbImage>, String> {
        let read = self.cap.read(&mut self.mat).map_err(|e| format!("OpenCV: read failed: {}", e))?;
        if !read {
            if !self.cap.is_opened().unwrap_or(false) {
                return Err("OpenCV: capture closed".to_string());
            }
            return Ok(None);
        }
        if self.mat.empty() {
            return Ok(None);
        }

        let mut rgb = opencv_core::Mat::default();
        imgproc::cvt_color_def(&self.mat, &mut rgb, imgproc::COLOR_BGR2RGB)
            .map_err(|e| format!("OpenCV: BGR to RGB conversion failed: {}", e))?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb
            .data_bytes()
            .map_err(|e| format!("OpenCV: frame is not continuous: {}", e))?
            .to_vec();
        Ok(RgbImage::from_raw(width, height, bytes))
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            debug!("OpenCV: release failed: {}", e);
        }
    }
}
