use crate::alerts::AlertManager;
use crate::app_config::{ApplicationConfig, RetryPolicy};
use crate::camera::camera_entity::CameraStatus;
use crate::camera_config::CameraConfig;
use crate::core::camera_registry::CameraRegistry;
use crate::core::capture_source::{Frame, FrameStream, SourceBackend};
use crate::detection::{DetectionEngine, DetectionEvent};
use crate::errors::SourceError;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Shared handles injected into every camera pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub registry: Arc<CameraRegistry>,
    pub alerts: Arc<AlertManager>,
    pub backend: Arc<dyn SourceBackend>,
    pub settings: ApplicationConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineExit {
    Shutdown,
    Failed(SourceError),
    /// Detection panicked; the detector state is gone with it.
    Crashed(String),
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

// Resolves once shutdown is requested or the controller went away.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Opens the camera's source. Network cameras retry `ConnectFailed` with bounded
/// exponential backoff; every other error fails immediately.
/// `Ok(None)` means shutdown was requested while waiting.
pub async fn open_with_retry(
    backend: &dyn SourceBackend,
    camera: &CameraConfig,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<Box<dyn FrameStream>>, SourceError> {
    let max_attempts = if camera.source_kind.is_network() { policy.max_attempts.max(1) } else { 1 };
    let mut attempt = 0;

    loop {
        if shutdown_requested(shutdown) {
            return Ok(None);
        }
        attempt += 1;
        let open_start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Ok(None),
            result = backend.open(camera) => result,
        };

        match result {
            Ok(stream) => {
                info!(
                    "📷 Camera [{}]: opened {} in {:?} (attempt {}).",
                    camera.id,
                    stream.describe(),
                    open_start.elapsed(),
                    attempt
                );
                return Ok(Some(stream));
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_after(attempt);
                warn!(
                    "⚠️ Camera [{}]: attempt {}/{} failed: {}. Retrying in {:?}.",
                    camera.id, attempt, max_attempts, e, delay
                );
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(shutdown) => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                error!("❌ Camera [{}]: failed to open source after {} attempt(s): {}", camera.id, attempt, e);
                return Err(e);
            }
        }
    }
}

enum Tick {
    Shutdown,
    Frame(Result<Option<Frame>, SourceError>),
}

/// One camera's ingestion and detection loop. Owns its stream and detector state.
pub struct CameraPipeline {
    camera: CameraConfig,
    context: PipelineContext,
    stream: Box<dyn FrameStream>,
    // Lent to the blocking pool while a frame is analysed.
    engine: Option<DetectionEngine>,
    shutdown: watch::Receiver<bool>,
}

impl CameraPipeline {
    pub fn new(
        camera: CameraConfig,
        context: PipelineContext,
        stream: Box<dyn FrameStream>,
        engine: DetectionEngine,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        CameraPipeline {
            camera,
            context,
            stream,
            engine: Some(engine),
            shutdown,
        }
    }

    /// Runs until shutdown or an unrecoverable source failure. The stream is always
    /// closed and the camera always ends `Stopped` or `Error`.
    pub async fn run(mut self) -> PipelineExit {
        let camera_id = self.camera.id.clone();
        let kinds = self.engine.as_ref().map(DetectionEngine::kinds).unwrap_or_default();
        info!("▶️ Camera [{}]: pipeline started with detectors {:?}.", camera_id, kinds);

        let exit = self.process_frames().await;
        self.stream.close().await;

        let final_status = match &exit {
            PipelineExit::Shutdown => {
                info!("⏹️ Camera [{}]: pipeline stopped.", camera_id);
                CameraStatus::Stopped
            }
            PipelineExit::Failed(e) => {
                error!("❌ Camera [{}]: pipeline failed: {}", camera_id, e);
                CameraStatus::Error(e.to_string())
            }
            PipelineExit::Crashed(reason) => {
                error!("💀 Camera [{}]: {}", camera_id, reason);
                CameraStatus::Error(reason.clone())
            }
        };
        if let Err(e) = self.context.registry.update_status(&camera_id, final_status).await {
            warn!("Camera [{}]: could not record final status: {}", camera_id, e);
        }
        exit
    }

    async fn process_frames(&mut self) -> PipelineExit {
        let settings = self.context.settings.clone();
        let frame_wait = settings.frame_wait();
        let stream_timeout = settings.stream_timeout();
        let frame_budget = settings.frame_budget();
        let mut last_frame_at = Instant::now();

        loop {
            if shutdown_requested(&self.shutdown) {
                return PipelineExit::Shutdown;
            }

            let tick = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => Tick::Shutdown,
                result = self.stream.next_frame(frame_wait) => Tick::Frame(result),
            };

            match tick {
                Tick::Shutdown => return PipelineExit::Shutdown,
                Tick::Frame(Ok(Some(frame))) => {
                    last_frame_at = Instant::now();
                    self.context.registry.touch(&self.camera.id, last_frame_at).await;

                    // Stop requests are honoured before handing the frame to the detectors.
                    if shutdown_requested(&self.shutdown) {
                        return PipelineExit::Shutdown;
                    }
                    let detect_start = Instant::now();
                    let sequence = frame.sequence;
                    let events = match self.detect(frame).await {
                        Ok(events) => events,
                        Err(reason) => return PipelineExit::Crashed(reason),
                    };
                    let elapsed = detect_start.elapsed();
                    if elapsed > frame_budget {
                        warn!(
                            "🐢 Camera [{}]: frame {} took {:?} in detection (budget {:?}).",
                            self.camera.id, sequence, elapsed, frame_budget
                        );
                    }
                    for event in events {
                        self.context.alerts.ingest(event).await;
                    }
                }
                Tick::Frame(Ok(None)) => {
                    if last_frame_at.elapsed() >= stream_timeout {
                        return PipelineExit::Failed(SourceError::StreamTimeout(stream_timeout));
                    }
                }
                Tick::Frame(Err(e)) => {
                    if !(self.camera.source_kind.is_network() && e.is_retryable()) {
                        return PipelineExit::Failed(e);
                    }
                    warn!("🔌 Camera [{}]: stream dropped ({}). Reconnecting...", self.camera.id, e);
                    match self.reconnect().await {
                        Ok(true) => last_frame_at = Instant::now(),
                        Ok(false) => return PipelineExit::Shutdown,
                        Err(e) => return PipelineExit::Failed(e),
                    }
                }
            }
        }
    }

    /// Runs the detectors on the blocking pool so full-size frames never stall the
    /// runtime. The engine travels with the frame and comes back with the events.
    async fn detect(&mut self, frame: Frame) -> Result<Vec<DetectionEvent>, String> {
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| "detection engine lost by an earlier frame".to_string())?;
        let analysed = tokio::task::spawn_blocking(move || {
            let events = engine.process(&frame);
            (engine, events)
        })
        .await;
        match analysed {
            Ok((engine, events)) => {
                self.engine = Some(engine);
                Ok(events)
            }
            Err(join_err) => Err(format!("detection task failed: {}", join_err)),
        }
    }

    // Ok(false) when shutdown interrupted the reconnect.
    async fn reconnect(&mut self) -> Result<bool, SourceError> {
        let registry = Arc::clone(&self.context.registry);
        let _ = registry.update_status(&self.camera.id, CameraStatus::Connecting).await;
        self.stream.close().await;
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }

        let backend = Arc::clone(&self.context.backend);
        let opened = open_with_retry(
            backend.as_ref(),
            &self.camera,
            &self.context.settings.retry,
            &mut self.shutdown,
        )
        .await?;

        match opened {
            Some(stream) => {
                self.stream = stream;
                let _ = registry.update_status(&self.camera.id, CameraStatus::Running).await;
                debug!("Camera [{}]: reconnected.", self.camera.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
