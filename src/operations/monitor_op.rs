use crate::common::timestamp_utils;
use crate::core::events::SystemEvent;
use crate::core::system_controller::SystemController;
use anyhow::{Context, Result};
use clap::ArgMatches;
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

fn log_event(event: &SystemEvent) {
    match event {
        SystemEvent::CameraStatusChanged { camera_id, previous, current } => {
            info!("📡 Camera [{}]: {} -> {}", camera_id, previous, current);
        }
        SystemEvent::AlertRaised(alert) => warn!("🚨 NEW {}", alert.summary()),
        SystemEvent::AlertUpdated(alert) => debug!("🔁 {}", alert.summary()),
        SystemEvent::SystemStarted { running, failed } => {
            info!("🟢 System started. Running: {:?}. Failed: {:?}", running, failed);
        }
        SystemEvent::SystemStopped => info!("🔴 System stopped."),
        SystemEvent::SystemFailure(reason) => error!("❌ System failure: {}", reason),
    }
}

/// Runs detection on every camera until Ctrl-C or the optional `--duration` elapses.
pub async fn handle_monitor_cli(controller: &SystemController, args: &ArgMatches) -> Result<()> {
    let monitor_start_time = Instant::now();
    let duration = args.get_one::<u64>("duration").map(|secs| Duration::from_secs(*secs));
    let mut events = controller.subscribe();

    controller.start().await.context("Failed to start monitoring")?;
    match duration {
        Some(d) => info!("👀 Monitoring for {:?} (Ctrl-C to stop early)...", d),
        None => info!("👀 Monitoring until Ctrl-C..."),
    }

    let deadline = tokio::time::sleep(duration.unwrap_or(Duration::from_secs(86_400)));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Ctrl-C received.");
                break;
            }
            _ = &mut deadline, if duration.is_some() => {
                info!("⏰ Monitoring duration elapsed.");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("⚠️ Event log fell behind, {} event(s) skipped.", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let stop_result = controller.stop().await;
    while let Ok(event) = events.try_recv() {
        log_event(&event);
    }

    let status = controller.status().await;
    let alerts = controller.alerts().await;
    info!("📋 --- Monitoring Summary ({}) ---", timestamp_utils::current_local_timestamp_str(timestamp_utils::WALL_CLOCK_FORMAT));
    for camera in &status.cameras {
        info!("  Camera [{}] @ {}: {}", camera.id(), camera.location(), camera.status);
    }
    info!("  {} alert(s), {} unacknowledged.", alerts.len(), alerts.iter().filter(|a| !a.acknowledged).count());
    for alert in &alerts {
        info!("  {}", alert.summary());
    }
    info!("🏁 Monitoring finished in {:?}.", monitor_start_time.elapsed());

    stop_result.context("Shutdown did not complete cleanly")?;
    Ok(())
}
