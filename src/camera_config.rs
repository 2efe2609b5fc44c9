use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Rtsp,
    Rtmp,
}

impl SourceKind {
    pub fn is_network(self) -> bool {
        matches!(self, SourceKind::Rtsp | SourceKind::Rtmp)
    }

    fn accepted_schemes(self) -> &'static [&'static str] {
        match self {
            SourceKind::Local => &[],
            SourceKind::Rtsp => &["rtsp://", "rtsps://"],
            SourceKind::Rtmp => &["rtmp://", "rtmps://"],
        }
    }

    fn scheme_hint(self) -> &'static str {
        match self {
            SourceKind::Local => "a device index",
            SourceKind::Rtsp => "rtsp:// or rtsps://",
            SourceKind::Rtmp => "rtmp:// or rtmps://",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Rtsp => write!(f, "rtsp"),
            SourceKind::Rtmp => write!(f, "rtmp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Motion,
    Fire,
    Intrusion,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Motion => write!(f, "motion"),
            DetectorKind::Fire => write!(f, "fire"),
            DetectorKind::Intrusion => write!(f, "intrusion"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub location: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub source_address: String, // device index for local cameras, stream URL otherwise
    #[serde(default)]
    pub detectors: BTreeSet<DetectorKind>,
}

impl CameraConfig {
    pub fn local(id: &str, location: &str, device_index: u32) -> Self {
        CameraConfig {
            id: id.to_string(),
            location: location.to_string(),
            source_kind: SourceKind::Local,
            source_address: device_index.to_string(),
            detectors: BTreeSet::new(),
        }
    }

    pub fn stream(id: &str, location: &str, kind: SourceKind, url: &str) -> Self {
        CameraConfig {
            id: id.to_string(),
            location: location.to_string(),
            source_kind: kind,
            source_address: url.to_string(),
            detectors: BTreeSet::new(),
        }
    }

    pub fn with_detectors(mut self, detectors: &[DetectorKind]) -> Self {
        self.detectors = detectors.iter().copied().collect();
        self
    }

    /// Empty local addresses select the default device.
    pub fn device_index(&self) -> Result<u32, ConfigurationError> {
        let trimmed = self.source_address.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse::<u32>().map_err(|_| ConfigurationError::InvalidDeviceIndex {
            camera_id: self.id.clone(),
            address: self.source_address.clone(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::EmptyCameraId);
        }
        match self.source_kind {
            SourceKind::Local => {
                self.device_index()?;
            }
            kind => {
                let address = self.source_address.trim();
                if address.is_empty() {
                    return Err(ConfigurationError::InvalidAddress {
                        camera_id: self.id.clone(),
                        details: format!("{} stream URL cannot be empty", kind),
                    });
                }
                let lowered = address.to_ascii_lowercase();
                if !kind.accepted_schemes().iter().any(|s| lowered.starts_with(s)) {
                    return Err(ConfigurationError::UnsupportedScheme {
                        camera_id: self.id.clone(),
                        expected: kind.scheme_hint(),
                        address: self.source_address.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
