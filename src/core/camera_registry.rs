use crate::camera::camera_entity::{CameraEntity, CameraStatus};
use crate::camera_config::CameraConfig;
use crate::core::events::{EventBus, SystemEvent};
use crate::errors::{ConfigurationError, RegistryError};
use log::{debug, info};
use std::time::Instant as StdInstant;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Owns every camera record. Pipelines and the controller only hold ids.
pub struct CameraRegistry {
    cameras: Mutex<Vec<CameraEntity>>, // registration order
    events: EventBus,
}

impl CameraRegistry {
    pub fn new(events: EventBus) -> Self {
        CameraRegistry {
            cameras: Mutex::new(Vec::new()),
            events,
        }
    }

    pub async fn from_configs(configs: &[CameraConfig], events: EventBus) -> Result<Self, ConfigurationError> {
        debug!("🛠️ Initializing CameraRegistry...");
        let start_time = StdInstant::now();
        let registry = CameraRegistry::new(events);
        for (idx, cam_config) in configs.iter().enumerate() {
            debug!("  Processing camera config #{}: {}", idx + 1, cam_config.id);
            registry.add(cam_config.clone()).await?;
        }
        info!("✅ CameraRegistry initialized with {} cameras in {:?}.", configs.len(), start_time.elapsed());
        Ok(registry)
    }

    /// Validates and registers a camera in `Stopped` state.
    pub async fn add(&self, config: CameraConfig) -> Result<String, ConfigurationError> {
        config.validate()?;
        let mut cameras = self.cameras.lock().await;
        if cameras.iter().any(|c| c.id() == config.id) {
            return Err(ConfigurationError::DuplicateId(config.id));
        }
        let id = config.id.clone();
        cameras.push(CameraEntity::new(config));
        debug!("  Added camera '{}' to registry.", id);
        Ok(id)
    }

    /// Only stopped cameras can be removed.
    pub async fn remove(&self, id: &str) -> Result<CameraConfig, RegistryError> {
        let mut cameras = self.cameras.lock().await;
        let idx = cameras
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| RegistryError::UnknownCamera(id.to_string()))?;
        if cameras[idx].status != CameraStatus::Stopped {
            return Err(RegistryError::CameraBusy {
                id: id.to_string(),
                status: cameras[idx].status.clone(),
            });
        }
        info!("🗑️ Camera '{}' removed from registry.", id);
        Ok(cameras.remove(idx).config)
    }

    pub async fn update_status(&self, id: &str, status: CameraStatus) -> Result<(), RegistryError> {
        let mut cameras = self.cameras.lock().await;
        let camera = cameras
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| RegistryError::UnknownCamera(id.to_string()))?;
        if let Some(previous) = camera.update_state(status.clone()) {
            drop(cameras);
            self.events.publish(SystemEvent::CameraStatusChanged {
                camera_id: id.to_string(),
                previous,
                current: status,
            });
        }
        Ok(())
    }

    /// Records liveness; called after every frame wait.
    pub async fn touch(&self, id: &str, at: Instant) {
        let mut cameras = self.cameras.lock().await;
        if let Some(camera) = cameras.iter_mut().find(|c| c.id() == id) {
            camera.last_activity = Some(at);
        }
    }

    /// Operator action: `Error` back to `Stopped`. Other states are left untouched.
    pub async fn reset(&self, id: &str) -> Result<CameraStatus, RegistryError> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| RegistryError::UnknownCamera(id.to_string()))?
            .status;
        if let CameraStatus::Error(_) = current {
            self.update_status(id, CameraStatus::Stopped).await?;
            return Ok(CameraStatus::Stopped);
        }
        Ok(current)
    }

    pub async fn get(&self, id: &str) -> Option<CameraEntity> {
        self.cameras.lock().await.iter().find(|c| c.id() == id).cloned()
    }

    /// Snapshot in registration order.
    pub async fn list(&self) -> Vec<CameraEntity> {
        self.cameras.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.cameras.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cameras.lock().await.is_empty()
    }
}
