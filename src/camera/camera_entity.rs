use crate::camera_config::{CameraConfig, DetectorKind, SourceKind};
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum CameraStatus {
    Stopped,
    Connecting,
    Running,
    Error(String),
}

impl CameraStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, CameraStatus::Connecting | CameraStatus::Running)
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Stopped => write!(f, "stopped"),
            CameraStatus::Connecting => write!(f, "connecting"),
            CameraStatus::Running => write!(f, "running"),
            CameraStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// The registry's record of one camera. Everything else refers to it by id.
#[derive(Debug, Clone)]
pub struct CameraEntity {
    pub config: CameraConfig,
    pub status: CameraStatus,
    pub last_activity: Option<Instant>,
}

impl CameraEntity {
    pub fn new(config: CameraConfig) -> Self {
        CameraEntity {
            config,
            status: CameraStatus::Stopped,
            last_activity: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn location(&self) -> &str {
        &self.config.location
    }

    pub fn source_kind(&self) -> SourceKind {
        self.config.source_kind
    }

    pub fn detectors(&self) -> &BTreeSet<DetectorKind> {
        &self.config.detectors
    }

    /// Returns the previous status when it actually changed.
    pub fn update_state(&mut self, new_status: CameraStatus) -> Option<CameraStatus> {
        if self.status == new_status {
            return None;
        }
        info!("Camera '{}' state changed from {} to {}", self.config.id, self.status, new_status);
        Some(std::mem::replace(&mut self.status, new_status))
    }
}
