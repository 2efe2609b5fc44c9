use crate::app_config::ApplicationConfig;
use crate::camera_config::CameraConfig;
use crate::detection_config::DetectionConfig;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Instant;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MasterConfig {
    #[serde(rename = "application", default)]
    pub app_settings: ApplicationConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

pub fn load_config(path: &str) -> Result<MasterConfig> {
    debug!("📄 Attempting to load config from: {}", path);
    let start_time = Instant::now();

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'. 📖", path))?;
    debug!("Read config file in {:?}", start_time.elapsed());

    let config = parse_config(&config_str)
        .with_context(|| format!("Invalid configuration in '{}'", path))?;

    info!("✅ Successfully loaded and validated configuration from '{}' in {:?}", path, start_time.elapsed());
    Ok(config)
}

pub fn parse_config(yaml: &str) -> Result<MasterConfig> {
    let parse_start_time = Instant::now();
    let config: MasterConfig = serde_yaml::from_str(yaml)
        .context("Failed to parse YAML configuration. 💔")?;
    debug!("Parsed YAML in {:?}", parse_start_time.elapsed());

    validate_master_config(&config).context("Master configuration validation failed 👎")?;
    Ok(config)
}

fn validate_master_config(config: &MasterConfig) -> Result<()> {
    debug!("🕵️ Validating master configuration...");
    let validation_start_time = Instant::now();
    let app = &config.app_settings;

    if app.frame_wait_ms == 0 {
        bail!("❌ application.frame_wait_ms must be positive; a zero wait would spin.");
    }
    if app.stream_timeout_ms < app.frame_wait_ms {
        bail!(
            "❌ application.stream_timeout_ms ({}) must not be shorter than frame_wait_ms ({}).",
            app.stream_timeout_ms,
            app.frame_wait_ms
        );
    }
    if app.retry.max_attempts == 0 {
        bail!("❌ application.retry.max_attempts must be at least 1.");
    }
    if app.event_channel_capacity == 0 {
        bail!("❌ application.event_channel_capacity must be at least 1.");
    }

    let problems = config.detection.problems();
    if !problems.is_empty() {
        bail!("❌ Detection settings are invalid: {}", problems.join("; "));
    }

    if config.cameras.is_empty() {
        warn!("⚠️ No cameras defined in the configuration. Only listing operations will be useful.");
    }

    let mut camera_ids = HashSet::new();
    for (idx, camera) in config.cameras.iter().enumerate() {
        debug!("Validating camera #{}: {}", idx + 1, camera.id);
        camera
            .validate()
            .with_context(|| format!("❌ Camera #{} is invalid", idx + 1))?;
        if !camera_ids.insert(camera.id.as_str()) {
            bail!("❌ Duplicate camera id found: {}", camera.id);
        }
        if camera.detectors.is_empty() {
            warn!("⚠️ Camera '{}' has no detectors enabled; it will only be monitored for liveness.", camera.id);
        }
        debug!("Camera '{}' validated successfully.", camera.id);
    }
    info!("👍 Master configuration validated successfully in {:?}.", validation_start_time.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_config::{DetectorKind, SourceKind};

    const SAMPLE: &str = r#"
application:
  log_level: debug
  coalescing_window_ms: 3000
  retry:
    max_attempts: 3
detection:
  motion:
    changed_ratio_threshold: 0.05
cameras:
  - id: cam-1
    location: Lobby
    source_kind: local
    source_address: "0"
    detectors: [motion]
  - id: cam-2
    location: Gate
    source_kind: rtsp
    source_address: rtsp://10.0.0.7:554/stream1
    detectors: [intrusion, fire]
"#;

    #[test]
    fn parses_full_document() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.app_settings.coalescing_window_ms, 3_000);
        assert_eq!(cfg.app_settings.retry.max_attempts, 3);
        assert_eq!(cfg.app_settings.retry.initial_backoff_ms, 500);
        assert_eq!(cfg.detection.motion.changed_ratio_threshold, 0.05);
        assert_eq!(cfg.cameras.len(), 2);
        assert_eq!(cfg.cameras[1].source_kind, SourceKind::Rtsp);
        assert!(cfg.cameras[1].detectors.contains(&DetectorKind::Intrusion));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = r#"
cameras:
  - { id: cam-1, source_kind: local }
  - { id: cam-1, source_kind: local, source_address: "1" }
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate camera id"));
    }

    #[test]
    fn rejects_empty_stream_url() {
        let yaml = "cameras:\n  - { id: cam-2, source_kind: rtmp, source_address: \"\" }\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("cannot be empty"));
    }

    #[test]
    fn rejects_timeout_shorter_than_frame_wait() {
        let yaml = "application:\n  frame_wait_ms: 2000\n  stream_timeout_ms: 1000\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse_config("{}").unwrap();
        assert!(cfg.cameras.is_empty());
        assert_eq!(cfg.app_settings, ApplicationConfig::default());
    }
}
