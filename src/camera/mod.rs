pub mod camera_entity;
pub mod local_device;
pub mod network_stream;
pub mod open_gate;
#[cfg(feature = "opencv")]
pub mod opencv_decoder;
pub mod source_backend;
pub mod threaded_reader;
pub mod video_decoder;

pub use crate::camera_config::CameraConfig;
pub use camera_entity::{CameraEntity, CameraStatus};
