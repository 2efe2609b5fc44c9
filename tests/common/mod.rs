#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use owlwatch::camera_config::CameraConfig;
use owlwatch::config_loader::MasterConfig;
use owlwatch::core::camera_registry::CameraRegistry;
use owlwatch::core::capture_source::{Frame, FrameStream, SourceBackend};
use owlwatch::core::events::EventBus;
use owlwatch::core::system_controller::SystemController;
use owlwatch::errors::SourceError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

type Feed = Arc<Mutex<mpsc::UnboundedReceiver<RgbImage>>>;

#[derive(Clone)]
struct FakeCamera {
    feed: Feed,
    fail_opens: bool,
    hang_on_close: bool,
}

/// Backend whose streams deliver exactly the frames a test pushes, and which counts
/// every handle that was opened and not yet closed.
#[derive(Default)]
pub struct FakeBackend {
    cameras: StdMutex<HashMap<String, FakeCamera>>,
    opens: AtomicUsize,
    open_handles: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeBackend::default())
    }

    /// Registers a camera and returns the sender feeding its frames.
    pub fn camera(&self, id: &str) -> mpsc::UnboundedSender<RgbImage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.cameras.lock().unwrap().insert(
            id.to_string(),
            FakeCamera {
                feed: Arc::new(Mutex::new(rx)),
                fail_opens: false,
                hang_on_close: false,
            },
        );
        tx
    }

    pub fn fail_opens(&self, id: &str) {
        let _ = self.camera(id);
        self.cameras.lock().unwrap().get_mut(id).unwrap().fail_opens = true;
    }

    pub fn hang_on_close(&self, id: &str) {
        self.cameras.lock().unwrap().get_mut(id).unwrap().hang_on_close = true;
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceBackend for FakeBackend {
    async fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameStream>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let fake = self.cameras.lock().unwrap().get(&camera.id).cloned();
        let fake = match fake {
            Some(fake) if !fake.fail_opens => fake,
            _ if camera.source_kind.is_network() => {
                return Err(SourceError::ConnectFailed {
                    address: camera.source_address.clone(),
                    details: "connection refused".to_string(),
                })
            }
            _ => {
                return Err(SourceError::DeviceUnavailable {
                    index: camera.device_index().unwrap_or(0),
                    details: "device busy".to_string(),
                })
            }
        };
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            camera_id: camera.id.clone(),
            feed: fake.feed,
            hang_on_close: fake.hang_on_close,
            sequence: 0,
            closed: false,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }
}

struct FakeStream {
    camera_id: String,
    feed: Feed,
    hang_on_close: bool,
    sequence: u64,
    closed: bool,
    open_handles: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
        let mut feed = self.feed.lock().await;
        match tokio::time::timeout(wait, feed.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(image)) => {
                self.sequence += 1;
                Ok(Some(Frame::new(&self.camera_id, self.sequence, Instant::now(), image)))
            }
            Ok(None) => {
                drop(feed);
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        if !self.closed {
            self.closed = true;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn describe(&self) -> String {
        format!("fake stream for {}", self.camera_id)
    }
}

pub fn dark() -> RgbImage {
    RgbImage::new(32, 24)
}

pub fn bright() -> RgbImage {
    RgbImage::from_pixel(32, 24, Rgb([255, 255, 255]))
}

pub fn flames() -> RgbImage {
    RgbImage::from_pixel(32, 24, Rgb([255, 80, 0]))
}

pub fn fast_config(cameras: Vec<CameraConfig>) -> MasterConfig {
    let mut config = MasterConfig::default();
    config.app_settings.frame_wait_ms = 20;
    config.app_settings.stream_timeout_ms = 30_000;
    config.app_settings.shutdown_grace_ms = 500;
    config.app_settings.retry.initial_backoff_ms = 5;
    config.app_settings.retry.max_backoff_ms = 20;
    config.app_settings.retry.max_attempts = 2;
    config.cameras = cameras;
    config
}

pub async fn controller(config: &MasterConfig, backend: Arc<FakeBackend>) -> SystemController {
    let events = EventBus::new(256);
    let registry = Arc::new(
        CameraRegistry::from_configs(&config.cameras, events.clone())
            .await
            .expect("valid cameras"),
    );
    SystemController::new(registry, backend, config, events)
}

/// Polls `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
