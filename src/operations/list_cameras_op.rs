use crate::core::camera_registry::CameraRegistry;
use anyhow::Result;
use log::{info, warn};

pub async fn handle_list_cameras_cli(registry: &CameraRegistry) -> Result<()> {
    let cameras = registry.list().await;
    if cameras.is_empty() {
        warn!("⚠️ No cameras configured.");
        return Ok(());
    }
    info!("📷 {} camera(s) configured:", cameras.len());
    for (idx, camera) in cameras.iter().enumerate() {
        let detectors: Vec<String> = camera.detectors().iter().map(|d| d.to_string()).collect();
        info!(
            "  {}. [{}] {} ({} {}) detectors: [{}] status: {}",
            idx + 1,
            camera.id(),
            camera.location(),
            camera.source_kind(),
            camera.config.source_address,
            detectors.join(", "),
            camera.status
        );
    }
    Ok(())
}
