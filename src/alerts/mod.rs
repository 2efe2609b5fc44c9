pub mod alert_manager;

pub use alert_manager::{Alert, AlertId, AlertManager};
