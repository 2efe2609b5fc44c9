use crate::alerts::{Alert, AlertId, AlertManager};
use crate::app_config::ApplicationConfig;
use crate::camera::camera_entity::{CameraEntity, CameraStatus};
use crate::camera::source_backend::CameraSourceBackend;
use crate::camera_config::CameraConfig;
use crate::config_loader::MasterConfig;
use crate::core::camera_registry::CameraRegistry;
use crate::core::capture_source::{FrameStream, SourceBackend};
use crate::core::events::{EventBus, SystemEvent};
use crate::core::pipeline::{open_with_retry, CameraPipeline, PipelineContext};
use crate::detection::DetectionEngine;
use crate::detection_config::DetectionConfig;
use crate::errors::{AlertError, ConfigurationError, RegistryError, SourceError, SystemError};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant as StdInstant;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemState::Stopped => write!(f, "stopped"),
            SystemState::Starting => write!(f, "starting"),
            SystemState::Running => write!(f, "running"),
            SystemState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Global state plus a per-camera snapshot in registration order.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub state: SystemState,
    pub cameras: Vec<CameraEntity>,
}

impl SystemStatus {
    pub fn running_cameras(&self) -> usize {
        self.cameras.iter().filter(|c| c.status == CameraStatus::Running).count()
    }

    pub fn failed_cameras(&self) -> usize {
        self.cameras.iter().filter(|c| matches!(c.status, CameraStatus::Error(_))).count()
    }
}

struct RunningPipeline {
    camera_id: String,
    handle: JoinHandle<()>,
}

struct Phase {
    state: SystemState,
    live_pipelines: usize,
    // Fired by stop(). Every open and pipeline of the current run listens to it.
    halt: Option<watch::Sender<bool>>,
}

type SharedPhase = Arc<Mutex<Phase>>;

fn lock_phase(phase: &SharedPhase) -> std::sync::MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

// Called by each pipeline task as it ends. The last one out while the system is
// running takes it down to `Stopped`, so a later start() can bring cameras back.
fn pipeline_ended(phase: &SharedPhase, events: &EventBus, camera_id: &str) {
    let mut current = lock_phase(phase);
    current.live_pipelines = current.live_pipelines.saturating_sub(1);
    // A missing halt sender means stop() is already winding the system down.
    if current.live_pipelines > 0 || current.state != SystemState::Running || current.halt.is_none() {
        return;
    }
    current.state = SystemState::Stopped;
    current.halt = None;
    drop(current);

    warn!("⚠️ Camera [{}] was the last running camera. System is no longer running.", camera_id);
    events.publish(SystemEvent::SystemFailure(format!(
        "every camera pipeline has ended (last: {})",
        camera_id
    )));
}

/// Starts and stops every camera pipeline and owns the process-wide alert store.
pub struct SystemController {
    registry: Arc<CameraRegistry>,
    backend: Arc<dyn SourceBackend>,
    alerts: Arc<AlertManager>,
    settings: ApplicationConfig,
    detection: DetectionConfig,
    events: EventBus,
    phase: SharedPhase,
    // Held for the whole of start() and stop() so the two never interleave.
    // stop() fires the halt signal before waiting on it.
    lifecycle: tokio::sync::Mutex<Vec<RunningPipeline>>,
}

impl SystemController {
    pub fn new(
        registry: Arc<CameraRegistry>,
        backend: Arc<dyn SourceBackend>,
        config: &MasterConfig,
        events: EventBus,
    ) -> Self {
        let alerts = Arc::new(AlertManager::new(config.app_settings.coalescing_window(), events.clone()));
        SystemController {
            registry,
            backend,
            alerts,
            settings: config.app_settings.clone(),
            detection: config.detection.clone(),
            events,
            phase: Arc::new(Mutex::new(Phase {
                state: SystemState::Stopped,
                live_pipelines: 0,
                halt: None,
            })),
            lifecycle: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Builds the registry, event bus and default decoding backend from a loaded config.
    pub async fn from_config(config: &MasterConfig) -> Result<Self, ConfigurationError> {
        let events = EventBus::new(config.app_settings.event_channel_capacity);
        let registry = Arc::new(CameraRegistry::from_configs(&config.cameras, events.clone()).await?);
        let backend: Arc<dyn SourceBackend> = Arc::new(CameraSourceBackend::with_default_decoder(&config.app_settings));
        Ok(SystemController::new(registry, backend, config, events))
    }

    pub fn state(&self) -> SystemState {
        lock_phase(&self.phase).state
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn SourceBackend> {
        &self.backend
    }

    pub fn settings(&self) -> &ApplicationConfig {
        &self.settings
    }

    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> SystemStatus {
        SystemStatus {
            state: self.state(),
            cameras: self.registry.list().await,
        }
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.alerts().await
    }

    pub async fn acknowledge(&self, id: AlertId) -> Result<(), AlertError> {
        self.alerts.acknowledge(id).await
    }

    /// Moves a camera out of `Error` so the next `start()` picks it up again.
    pub async fn reset_camera(&self, id: &str) -> Result<CameraStatus, RegistryError> {
        let status = self.registry.reset(id).await?;
        info!("🔄 Camera [{}] reset, now {}.", id, status);
        Ok(status)
    }

    /// Opens every startable camera concurrently and spawns its pipeline.
    /// Calling it while starting or running returns the current state. A `stop()`
    /// issued meanwhile cancels the pending opens and start() returns `Stopped`.
    pub async fn start(&self) -> Result<SystemState, SystemError> {
        let current = self.state();
        if matches!(current, SystemState::Starting | SystemState::Running) {
            debug!("start() ignored, system is already {}.", current);
            return Ok(current);
        }

        let mut pipelines = self.lifecycle.lock().await;
        let halted = {
            let mut phase = lock_phase(&self.phase);
            if matches!(phase.state, SystemState::Starting | SystemState::Running) {
                return Ok(phase.state);
            }
            phase.state = SystemState::Starting;
            let (halt_tx, halt_rx) = watch::channel(false);
            phase.halt = Some(halt_tx);
            halt_rx
        };
        // Left over from a run whose cameras all ended on their own.
        for finished in pipelines.drain(..) {
            let _ = finished.handle.await;
        }

        let start_time = StdInstant::now();
        info!("🚀 Starting system...");

        let cameras = self.registry.list().await;
        if cameras.is_empty() {
            return Err(self.fail_start(SystemError::NoCamerasConfigured));
        }

        let mut failures = Vec::new();
        let mut candidates = Vec::new();
        for camera in cameras {
            match &camera.status {
                CameraStatus::Error(reason) => {
                    warn!("⏭️ Camera [{}] skipped: still in error ({}). Reset it first.", camera.id(), reason);
                    failures.push(format!("{}: {}", camera.id(), reason));
                }
                _ => candidates.push(camera.config),
            }
        }
        let attempted = candidates.len();

        for camera in &candidates {
            let _ = self.registry.update_status(&camera.id, CameraStatus::Connecting).await;
        }

        let opens = candidates.into_iter().map(|camera| {
            let backend = Arc::clone(&self.backend);
            let retry = self.settings.retry.clone();
            let mut halt = halted.clone();
            async move {
                let opened = open_with_retry(backend.as_ref(), &camera, &retry, &mut halt).await;
                (camera, opened)
            }
        });
        let opened = join_all(opens).await;

        let mut ready: Vec<(CameraConfig, Box<dyn FrameStream>)> = Vec::new();
        for (camera, result) in opened {
            match result {
                Ok(Some(stream)) => ready.push((camera, stream)),
                Ok(None) => {
                    let _ = self.registry.update_status(&camera.id, CameraStatus::Stopped).await;
                }
                Err(e) => {
                    self.mark_start_failure(&camera.id, &e).await;
                    failures.push(format!("{}: {}", camera.id, e));
                }
            }
        }

        let was_halted = *halted.borrow();
        if was_halted {
            return Ok(self.abandon_start(ready, start_time).await);
        }
        if ready.is_empty() {
            for failure in &failures {
                error!("  - {}", failure);
            }
            return Err(self.fail_start(SystemError::NoCameraStarted { attempted, failures }));
        }

        let context = PipelineContext {
            registry: Arc::clone(&self.registry),
            alerts: Arc::clone(&self.alerts),
            backend: Arc::clone(&self.backend),
            settings: self.settings.clone(),
        };
        lock_phase(&self.phase).live_pipelines = ready.len();

        let mut running = Vec::new();
        for (camera, stream) in ready {
            let _ = self.registry.update_status(&camera.id, CameraStatus::Running).await;
            let engine = DetectionEngine::for_camera(&camera, &self.detection);
            let camera_id = camera.id.clone();
            let pipeline = CameraPipeline::new(camera, context.clone(), stream, engine, halted.clone());
            let phase = Arc::clone(&self.phase);
            let events = self.events.clone();
            let task_camera_id = camera_id.clone();
            let handle = tokio::spawn(async move {
                pipeline.run().await;
                pipeline_ended(&phase, &events, &task_camera_id);
            });
            running.push(camera_id.clone());
            pipelines.push(RunningPipeline { camera_id, handle });
        }

        let state = {
            let mut phase = lock_phase(&self.phase);
            // A pending stop() still needs Running to tear the pipelines down.
            let alive = phase.live_pipelines > 0 || phase.halt.is_none();
            phase.state = if alive { SystemState::Running } else { SystemState::Stopped };
            phase.state
        };
        info!(
            "✅ System running: {} camera(s) started, {} failed, in {:?}.",
            running.len(),
            failures.len(),
            start_time.elapsed()
        );
        self.events.publish(SystemEvent::SystemStarted { running, failed: failures });
        if state == SystemState::Stopped {
            warn!("⚠️ Every camera pipeline ended while the system was starting.");
            self.events
                .publish(SystemEvent::SystemFailure("every camera pipeline ended during startup".to_string()));
        }
        Ok(state)
    }

    // stop() arrived while cameras were still opening: hand back what did open.
    async fn abandon_start(
        &self,
        ready: Vec<(CameraConfig, Box<dyn FrameStream>)>,
        start_time: StdInstant,
    ) -> SystemState {
        for (camera, mut stream) in ready {
            stream.close().await;
            let _ = self.registry.update_status(&camera.id, CameraStatus::Stopped).await;
        }
        {
            let mut phase = lock_phase(&self.phase);
            phase.state = SystemState::Stopped;
            phase.halt = None;
        }
        info!("🛑 Start cancelled by stop after {:?}.", start_time.elapsed());
        self.events.publish(SystemEvent::SystemStopped);
        SystemState::Stopped
    }

    async fn mark_start_failure(&self, camera_id: &str, e: &SourceError) {
        error!("❌ Camera [{}] failed to start: {}", camera_id, e);
        let _ = self.registry.update_status(camera_id, CameraStatus::Error(e.to_string())).await;
    }

    fn fail_start(&self, e: SystemError) -> SystemError {
        {
            let mut phase = lock_phase(&self.phase);
            phase.state = SystemState::Stopped;
            phase.halt = None;
        }
        error!("❌ System failed to start: {}", e);
        self.events.publish(SystemEvent::SystemFailure(e.to_string()));
        e
    }

    fn fire_halt(&self) {
        if let Some(halt) = lock_phase(&self.phase).halt.take() {
            let _ = halt.send(true);
        }
    }

    /// Signals every pipeline (and any opens still in flight), waits up to the
    /// shutdown grace for all of them and aborts the rest. Every camera ends
    /// `Stopped` or `Error`.
    pub async fn stop(&self) -> Result<SystemState, SystemError> {
        let stop_time = StdInstant::now();
        {
            let mut phase = lock_phase(&self.phase);
            match phase.state {
                SystemState::Stopped | SystemState::Stopping => {
                    debug!("stop() ignored, system is already {}.", phase.state);
                    return Ok(phase.state);
                }
                SystemState::Running => phase.state = SystemState::Stopping,
                // start() still holds the lifecycle lock; the halt makes it give up.
                SystemState::Starting => {}
            }
            if let Some(halt) = phase.halt.take() {
                let _ = halt.send(true);
            }
        }

        let mut pipelines = self.lifecycle.lock().await;
        {
            let mut phase = lock_phase(&self.phase);
            if phase.state == SystemState::Stopped {
                return Ok(SystemState::Stopped);
            }
            phase.state = SystemState::Stopping;
        }

        let grace = self.settings.shutdown_grace();
        info!("🛑 Stopping {} pipeline(s) (grace {:?})...", pipelines.len(), grace);

        let deadline = tokio::time::Instant::now() + grace;
        let waits = pipelines.drain(..).map(|pipeline| async move {
            let RunningPipeline { camera_id, mut handle } = pipeline;
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => None,
                Ok(Err(join_error)) => {
                    error!("❌ Camera [{}] pipeline panicked: {}", camera_id, join_error);
                    Some((camera_id, "pipeline panicked".to_string()))
                }
                Err(_) => {
                    handle.abort();
                    Some((camera_id, format!("did not stop within {:?}", grace)))
                }
            }
        });
        let stragglers: Vec<(String, String)> = join_all(waits).await.into_iter().flatten().collect();
        drop(pipelines);

        for (camera_id, reason) in &stragglers {
            warn!("⚠️ Camera [{}] forced down: {}", camera_id, reason);
            let _ = self.registry.update_status(camera_id, CameraStatus::Error(reason.clone())).await;
        }
        for camera in self.registry.list().await {
            if camera.status.is_active() {
                let _ = self.registry.update_status(camera.id(), CameraStatus::Stopped).await;
            }
        }

        {
            let mut phase = lock_phase(&self.phase);
            phase.state = SystemState::Stopped;
            phase.live_pipelines = 0;
        }
        self.events.publish(SystemEvent::SystemStopped);

        if stragglers.is_empty() {
            info!("✅ System stopped in {:?}.", stop_time.elapsed());
            return Ok(SystemState::Stopped);
        }
        let e = SystemError::ShutdownTimedOut {
            grace,
            cameras: stragglers.into_iter().map(|(id, _)| id).collect(),
        };
        error!("❌ {}", e);
        self.events.publish(SystemEvent::SystemFailure(e.to_string()));
        Err(e)
    }
}

impl Drop for SystemController {
    fn drop(&mut self) {
        self.fire_halt();
    }
}
