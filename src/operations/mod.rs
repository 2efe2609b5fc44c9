pub mod diagnostic_op;
pub mod list_cameras_op;
pub mod monitor_op;
pub mod op_helper;
