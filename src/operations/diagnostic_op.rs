use crate::app_config::ApplicationConfig;
use crate::camera_config::CameraConfig;
use crate::core::capture_source::SourceBackend;
use crate::core::pipeline::open_with_retry;
use crate::core::system_controller::SystemController;
use crate::operations::op_helper::{run_generic_camera_op, OpSummary};
use anyhow::{anyhow, bail, Result};
use clap::ArgMatches;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Opens the camera's source, waits for one frame within the stream timeout and closes it.
pub async fn probe_camera(backend: &dyn SourceBackend, camera: &CameraConfig, settings: &ApplicationConfig) -> Result<()> {
    let probe_start = Instant::now();
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut stream = open_with_retry(backend, camera, &settings.retry, &mut shutdown_rx)
        .await?
        .ok_or_else(|| anyhow!("probe for '{}' was cancelled", camera.id))?;
    debug!("    DIAGNOSTIC [{}]: source opened in {:?}.", camera.id, probe_start.elapsed());

    let deadline = Instant::now() + settings.stream_timeout();
    let outcome = loop {
        if Instant::now() >= deadline {
            break Err(anyhow!("no frame within {:?}", settings.stream_timeout()));
        }
        match stream.next_frame(settings.frame_wait()).await {
            Ok(Some(frame)) if frame.is_empty() => break Err(anyhow!("received an empty frame")),
            Ok(Some(frame)) => break Ok((frame.width(), frame.height())),
            Ok(None) => continue,
            Err(e) => break Err(e.into()),
        }
    };
    stream.close().await;

    let (width, height) = outcome?;
    info!(
        "    DIAGNOSTIC [{}]: PASSED, first frame {}x{} after {:?}.",
        camera.id,
        width,
        height,
        probe_start.elapsed()
    );
    Ok(())
}

pub async fn handle_diagnostic_cli(controller: &SystemController, args: &ArgMatches) -> Result<()> {
    let overall_diag_start_time = Instant::now();
    info!("🩺 Starting diagnostic probe...");

    let backend = Arc::clone(controller.backend());
    let settings = controller.settings().clone();
    let summary: OpSummary = run_generic_camera_op(controller.registry(), args, "Diagnostic Probe", move |camera| {
        let backend = Arc::clone(&backend);
        let settings = settings.clone();
        async move { probe_camera(backend.as_ref(), &camera, &settings).await }
    })
    .await?;

    info!("📋 --- Diagnostic Summary ---");
    info!("  Passed: {}  Failed: {}", summary.succeeded, summary.failed);
    info!("🩺 Diagnostic probe finished in {:?}.", overall_diag_start_time.elapsed());

    if !summary.all_succeeded() {
        warn!("⚠️ Some cameras failed the probe. Check the logs above for details.");
        bail!("{} of {} camera(s) failed the probe", summary.failed, summary.succeeded + summary.failed);
    }
    Ok(())
}
