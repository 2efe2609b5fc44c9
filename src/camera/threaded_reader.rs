use crate::camera::video_decoder::FrameGrabber;
use crate::core::capture_source::{Frame, FrameStream};
use crate::errors::SourceError;
use async_trait::async_trait;
use image::RgbImage;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

/// Decoded frames waiting for the pipeline. New frames are dropped while this many are pending.
const MAX_PENDING_FRAMES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Device(u32),
    Url(String),
}

impl SourceOrigin {
    fn lost(&self, details: String) -> SourceError {
        match self {
            SourceOrigin::Device(index) => SourceError::DeviceUnavailable { index: *index, details },
            SourceOrigin::Url(address) => SourceError::ConnectFailed { address: address.clone(), details },
        }
    }
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Device(index) => write!(f, "device {}", index),
            SourceOrigin::Url(url) => write!(f, "{}", url),
        }
    }
}

enum ReaderMessage {
    Frame(RgbImage, Instant),
    Lost(String),
}

/// Runs a blocking grabber on a dedicated thread and hands frames to the async side.
pub struct ThreadedFrameStream {
    camera_id: String,
    origin: SourceOrigin,
    rx: mpsc::Receiver<ReaderMessage>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    sequence: u64,
    closed: bool,
}

impl ThreadedFrameStream {
    pub fn spawn(
        camera_id: &str,
        origin: SourceOrigin,
        grabber: Box<dyn FrameGrabber>,
        frame_interval: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(MAX_PENDING_FRAMES);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread_camera_id = camera_id.to_string();

        let reader = std::thread::Builder::new()
            .name(format!("capture-{}", camera_id))
            .spawn(move || capture_loop(thread_camera_id, grabber, tx, thread_running, frame_interval))?;

        Ok(ThreadedFrameStream {
            camera_id: camera_id.to_string(),
            origin,
            rx,
            running,
            reader: Some(reader),
            sequence: 0,
            closed: false,
        })
    }
}

fn capture_loop(
    camera_id: String,
    mut grabber: Box<dyn FrameGrabber>,
    tx: mpsc::Sender<ReaderMessage>,
    running: Arc<AtomicBool>,
    frame_interval: Duration,
) {
    debug!("Camera [{}]: capture thread started.", camera_id);
    let mut dropped: u64 = 0;

    while running.load(Ordering::Acquire) {
        let loop_start = std::time::Instant::now();

        match grabber.grab() {
            Ok(Some(image)) => match tx.try_send(ReaderMessage::Frame(image, Instant::now())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    if dropped % 100 == 1 {
                        debug!("Camera [{}]: consumer is behind, {} frame(s) dropped so far.", camera_id, dropped);
                    }
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Ok(None) => {
                debug!("Camera [{}]: decoder returned no frame.", camera_id);
            }
            Err(details) => {
                error!("❌ Camera [{}]: capture lost: {}", camera_id, details);
                report_loss(&tx, &running, details);
                break;
            }
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }

    grabber.release();
    debug!("Camera [{}]: capture thread exited ({} frame(s) dropped).", camera_id, dropped);
}

// Keeps trying while the consumer is alive, so the loss is never silently swallowed
// behind a full queue.
fn report_loss(tx: &mpsc::Sender<ReaderMessage>, running: &AtomicBool, details: String) {
    let mut message = ReaderMessage::Lost(details);
    while running.load(Ordering::Acquire) {
        match tx.try_send(message) {
            Ok(()) | Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(returned)) => {
                message = returned;
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

#[async_trait]
impl FrameStream for ThreadedFrameStream {
    async fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
        if self.closed {
            return Err(self.origin.lost("source already closed".to_string()));
        }
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(self.origin.lost("capture thread stopped".to_string())),
            Ok(Some(ReaderMessage::Lost(details))) => Err(self.origin.lost(details)),
            Ok(Some(ReaderMessage::Frame(image, captured_at))) => {
                self.sequence += 1;
                Ok(Some(Frame::new(&self.camera_id, self.sequence, captured_at, image)))
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.running.store(false, Ordering::Release);
        self.rx.close();

        if let Some(reader) = self.reader.take() {
            let camera_id = self.camera_id.clone();
            match tokio::task::spawn_blocking(move || reader.join()).await {
                Ok(Ok(())) => info!("Camera [{}]: {} released.", camera_id, self.origin),
                Ok(Err(_)) => warn!("⚠️ Camera [{}]: capture thread panicked before release.", camera_id),
                Err(e) => warn!("⚠️ Camera [{}]: failed to join capture thread: {}", camera_id, e),
            }
        }
    }

    fn describe(&self) -> String {
        self.origin.to_string()
    }
}

impl Drop for ThreadedFrameStream {
    fn drop(&mut self) {
        // The thread notices on its next iteration and releases the grabber itself.
        self.running.store(false, Ordering::Release);
    }
}
