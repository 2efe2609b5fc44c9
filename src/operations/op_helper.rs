use crate::camera_config::CameraConfig;
use crate::core::camera_registry::CameraRegistry;
use anyhow::Result;
use clap::ArgMatches;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Outcome counts of a fan-out operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl OpSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub fn parse_camera_ids_arg(ids_str_opt: Option<&String>) -> Option<Vec<String>> {
    ids_str_opt.map(|ids_str| {
        ids_str.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    })
}

/// Cameras named by `--cameras` (all of them when absent), in registration order.
pub async fn select_cameras(registry: &CameraRegistry, args: &ArgMatches) -> Vec<CameraConfig> {
    let selection = parse_camera_ids_arg(args.try_get_one::<String>("cameras").ok().flatten());
    let cameras: Vec<CameraConfig> = registry.list().await.into_iter().map(|c| c.config).collect();
    match selection {
        Some(ids) => {
            for id in ids.iter().filter(|id| !cameras.iter().any(|c| &c.id == *id)) {
                warn!("⚠️ Camera '{}' is not configured and will be ignored.", id);
            }
            cameras.into_iter().filter(|c| ids.contains(&c.id)).collect()
        }
        None => cameras,
    }
}

/// Runs `per_camera_op` concurrently for every selected camera and counts the outcomes.
pub async fn run_generic_camera_op<F, Fut>(
    registry: &CameraRegistry,
    args: &ArgMatches,
    operation_display_name: &str,
    per_camera_op: F,
) -> Result<OpSummary>
where
    F: Fn(CameraConfig) -> Fut + Send + Sync + 'static + Clone,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let op_helper_start_time = Instant::now();
    info!("🛠️ Starting operation: '{}'...", operation_display_name);

    let cameras_to_target = select_cameras(registry, args).await;
    if cameras_to_target.is_empty() {
        warn!(
            "⚠️ No cameras selected for '{}'. Operation finished in {:?}",
            operation_display_name,
            op_helper_start_time.elapsed()
        );
        return Ok(OpSummary::default());
    }
    info!("🎯 Targeting {} camera(s) for {}.", cameras_to_target.len(), operation_display_name);

    let mut tasks: Vec<(String, JoinHandle<Result<()>>)> = Vec::new();
    for camera in cameras_to_target {
        let op_clone = per_camera_op.clone();
        let camera_id = camera.id.clone();
        let op_name = operation_display_name.to_string();
        tasks.push((
            camera_id.clone(),
            tokio::spawn(async move {
                debug!("    Task for camera '{}' (operation '{}') started.", camera_id, op_name);
                op_clone(camera).await
            }),
        ));
    }

    let (ids, handles): (Vec<String>, Vec<JoinHandle<Result<()>>>) = tasks.into_iter().unzip();
    let results = join_all(handles).await;

    let mut summary = OpSummary::default();
    for (camera_id, task_result) in ids.iter().zip(results) {
        match task_result {
            Ok(Ok(())) => {
                debug!("  Camera '{}' completed '{}'.", camera_id, operation_display_name);
                summary.succeeded += 1;
            }
            Ok(Err(op_err)) => {
                error!("❌ Error during '{}' for camera '{}': {:#}", operation_display_name, camera_id, op_err);
                summary.failed += 1;
            }
            Err(join_err) => {
                error!("💀 Task for camera '{}' failed (panic or cancellation): {:#}", camera_id, join_err);
                summary.failed += 1;
            }
        }
    }

    if summary.all_succeeded() {
        info!("✅ '{}' succeeded on all {} camera(s).", operation_display_name, summary.succeeded);
    } else {
        warn!(
            "⚠️ '{}' completed with {} error(s) out of {} camera(s). Please check logs.",
            operation_display_name,
            summary.failed,
            summary.succeeded + summary.failed
        );
    }
    info!("🏁 '{}' operation finished in {:?}.", operation_display_name, op_helper_start_time.elapsed());
    Ok(summary)
}
