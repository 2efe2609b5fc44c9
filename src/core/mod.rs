pub mod camera_registry;
pub mod capture_source;
pub mod events;
pub mod pipeline;
pub mod system_controller;

pub use camera_registry::CameraRegistry;
pub use system_controller::{SystemController, SystemState, SystemStatus};
