use crate::camera::camera_entity::CameraStatus;
use thiserror::Error;

/// A camera definition that was rejected before any resource was acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Camera id cannot be empty")]
    EmptyCameraId,

    #[error("Camera '{0}' is already registered")]
    DuplicateId(String),

    #[error("Invalid source address for camera '{camera_id}': {details}")]
    InvalidAddress { camera_id: String, details: String },

    #[error("Invalid local device index '{address}' for camera '{camera_id}'")]
    InvalidDeviceIndex { camera_id: String, address: String },

    #[error("Unsupported URL scheme for camera '{camera_id}': expected {expected}, got '{address}'")]
    UnsupportedScheme {
        camera_id: String,
        expected: &'static str,
        address: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Camera '{0}' is not registered")]
    UnknownCamera(String),

    #[error("Camera '{id}' is busy ({status}); stop it before removing")]
    CameraBusy { id: String, status: CameraStatus },
}

/// Per-camera source failures. These never unwind past the camera's pipeline;
/// they end up as an `Error(reason)` status instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Local device {index} is unavailable: {details}")]
    DeviceUnavailable { index: u32, details: String },

    #[error("Invalid stream address: {0}")]
    InvalidAddress(String),

    #[error("Camera definition rejected: {0}")]
    Misconfigured(#[from] ConfigurationError),

    #[error("Connection to '{address}' failed: {details}")]
    ConnectFailed { address: String, details: String },

    #[error("No frame received for {0:?}")]
    StreamTimeout(std::time::Duration),
}

impl SourceError {
    /// Failures worth another connection attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::ConnectFailed { .. })
    }
}

/// A detector could not process one frame. The frame is skipped for that detector only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Frame {sequence} has no pixels")]
    EmptyFrame { sequence: u64 },

    #[error("Protected region collapses to nothing on a {width}x{height} frame")]
    RegionOutOfBounds { width: u32, height: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("Alert #{0} does not exist")]
    UnknownAlert(u64),
}

/// Whole-system failures surfaced to the operator as a hard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("No cameras are configured")]
    NoCamerasConfigured,

    #[error("None of the {attempted} camera(s) could be started: {}", failures.join("; "))]
    NoCameraStarted {
        attempted: usize,
        failures: Vec<String>,
    },

    #[error("Shutdown did not complete within {grace:?} for camera(s): {}", cameras.join(", "))]
    ShutdownTimedOut {
        grace: std::time::Duration,
        cameras: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_failures_are_retryable() {
        let connect = SourceError::ConnectFailed {
            address: "rtsp://10.0.0.2/live".to_string(),
            details: "refused".to_string(),
        };
        assert!(connect.is_retryable());
        assert!(!SourceError::InvalidAddress(String::new()).is_retryable());
        assert!(!SourceError::DeviceUnavailable { index: 0, details: "busy".to_string() }.is_retryable());
    }

    #[test]
    fn no_camera_started_lists_every_failure() {
        let err = SystemError::NoCameraStarted {
            attempted: 2,
            failures: vec!["cam-1: refused".to_string(), "cam-2: busy".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "None of the 2 camera(s) could be started: cam-1: refused; cam-2: busy"
        );
    }
}
