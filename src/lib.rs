//! Multi-camera ingestion with per-camera motion, fire and intrusion detection,
//! time-windowed alert deduplication and a start/stop system controller.

pub mod alerts;
pub mod app_config;
pub mod camera;
pub mod camera_config;
pub mod cli;
pub mod common;
pub mod config_loader;
pub mod core;
pub mod detection;
pub mod detection_config;
pub mod errors;
pub mod operations;
