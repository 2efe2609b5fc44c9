use crate::alerts::alert_manager::Alert;
use crate::camera::camera_entity::CameraStatus;
use tokio::sync::broadcast;

/// Signals for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    CameraStatusChanged {
        camera_id: String,
        previous: CameraStatus,
        current: CameraStatus,
    },
    AlertRaised(Alert),
    AlertUpdated(Alert),
    SystemStarted {
        running: Vec<String>,
        failed: Vec<String>,
    },
    SystemStopped,
    SystemFailure(String),
}

/// Cheap to clone; publishing never blocks and never fails when nobody listens.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn publish(&self, event: SystemEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }
}
