use crate::camera_config::DetectorKind;
use crate::common::timestamp_utils;
use crate::core::events::{EventBus, SystemEvent};
use crate::detection::{DetectionEvent, Severity};
use crate::errors::AlertError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub type AlertId = u64;

/// A time-windowed incident for one camera+detector pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub camera_id: String,
    pub detector: DetectorKind,
    pub first_seen_at: Instant,
    pub last_seen_at: Instant,
    pub raised_at: DateTime<Utc>, // wall clock of the first event, for operators
    pub occurrence_count: u64,
    pub severity: Severity,
    pub details: String,
    pub acknowledged: bool,
}

impl Alert {
    pub fn summary(&self) -> String {
        format!(
            "#{} [{}] {} on '{}' x{} since {}: {}{}",
            self.id,
            self.severity,
            self.detector,
            self.camera_id,
            self.occurrence_count,
            timestamp_utils::format_wall_clock(&self.raised_at),
            self.details,
            if self.acknowledged { " (acknowledged)" } else { "" }
        )
    }
}

#[derive(Default)]
struct AlertStore {
    alerts: Vec<Alert>, // ordered by id; ids start at 1
    latest_by_key: HashMap<(String, DetectorKind), usize>,
}

/// Turns detection events into deduplicated alerts. Alerts are never removed.
pub struct AlertManager {
    coalescing_window: Duration,
    store: Mutex<AlertStore>,
    events: EventBus,
}

impl AlertManager {
    pub fn new(coalescing_window: Duration, events: EventBus) -> Self {
        AlertManager {
            coalescing_window,
            store: Mutex::new(AlertStore::default()),
            events,
        }
    }

    pub fn coalescing_window(&self) -> Duration {
        self.coalescing_window
    }

    /// Merges the event into the open incident for its key, or opens a new alert
    /// when the last update is older than the coalescing window.
    pub async fn ingest(&self, event: DetectionEvent) -> AlertId {
        let mut store = self.store.lock().await;
        let key = (event.camera_id.clone(), event.detector);

        let open_index = store.latest_by_key.get(&key).copied().filter(|&idx| {
            let alert = &store.alerts[idx];
            event.occurred_at.saturating_duration_since(alert.last_seen_at) <= self.coalescing_window
        });

        if let Some(idx) = open_index {
            let alert = &mut store.alerts[idx];
            alert.last_seen_at = alert.last_seen_at.max(event.occurred_at);
            alert.occurrence_count += 1;
            alert.severity = alert.severity.max(event.severity);
            alert.details = event.details;
            let snapshot = alert.clone();
            drop(store);

            debug!("🔁 Alert #{} updated ({} occurrences)", snapshot.id, snapshot.occurrence_count);
            let id = snapshot.id;
            self.events.publish(SystemEvent::AlertUpdated(snapshot));
            return id;
        }

        let id = store.alerts.len() as AlertId + 1;
        let alert = Alert {
            id,
            camera_id: event.camera_id,
            detector: event.detector,
            first_seen_at: event.occurred_at,
            last_seen_at: event.occurred_at,
            raised_at: Utc::now(),
            occurrence_count: 1,
            severity: event.severity,
            details: event.details,
            acknowledged: false,
        };
        store.alerts.push(alert.clone());
        let idx = store.alerts.len() - 1;
        store.latest_by_key.insert(key, idx);
        drop(store);

        info!("🚨 Alert raised: {}", alert.summary());
        self.events.publish(SystemEvent::AlertRaised(alert));
        id
    }

    /// Operator action. Does not stop later events from opening a new alert.
    pub async fn acknowledge(&self, id: AlertId) -> Result<(), AlertError> {
        let mut store = self.store.lock().await;
        let alert = id
            .checked_sub(1)
            .and_then(|idx| store.alerts.get_mut(idx as usize))
            .ok_or(AlertError::UnknownAlert(id))?;
        if alert.acknowledged {
            return Ok(());
        }
        alert.acknowledged = true;
        let snapshot = alert.clone();
        drop(store);

        info!("✅ Alert #{} acknowledged", id);
        self.events.publish(SystemEvent::AlertUpdated(snapshot));
        Ok(())
    }

    pub async fn get(&self, id: AlertId) -> Option<Alert> {
        let store = self.store.lock().await;
        id.checked_sub(1).and_then(|idx| store.alerts.get(idx as usize)).cloned()
    }

    /// Snapshot ordered by id.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.store.lock().await.alerts.clone()
    }

    pub async fn unacknowledged(&self) -> Vec<Alert> {
        let store = self.store.lock().await;
        store.alerts.iter().filter(|a| !a.acknowledged).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(camera: &str, detector: DetectorKind, at: Instant) -> DetectionEvent {
        DetectionEvent {
            camera_id: camera.to_string(),
            detector,
            occurred_at: at,
            severity: Severity::Info,
            confidence: 0.9,
            details: "test".to_string(),
        }
    }

    fn manager() -> AlertManager {
        AlertManager::new(Duration::from_secs(5), EventBus::new(16))
    }

    #[tokio::test]
    async fn events_within_window_coalesce() {
        let alerts = manager();
        let t0 = Instant::now();
        let mut ids = Vec::new();
        for i in 0..4u64 {
            ids.push(alerts.ingest(event("cam-1", DetectorKind::Motion, t0 + Duration::from_secs(4 * i))).await);
        }
        assert!(ids.iter().all(|&id| id == 1));
        let alert = alerts.get(1).await.unwrap();
        assert_eq!(alert.occurrence_count, 4);
        assert_eq!(alert.last_seen_at - alert.first_seen_at, Duration::from_secs(12));
    }

    #[tokio::test]
    async fn event_after_window_opens_new_alert() {
        let alerts = manager();
        let t0 = Instant::now();
        assert_eq!(alerts.ingest(event("cam-1", DetectorKind::Fire, t0)).await, 1);
        assert_eq!(alerts.ingest(event("cam-1", DetectorKind::Fire, t0 + Duration::from_secs(6))).await, 2);
        assert_eq!(alerts.ingest(event("cam-1", DetectorKind::Fire, t0 + Duration::from_secs(7))).await, 2);

        let all = alerts.alerts().await;
        assert_eq!(all.iter().map(|a| a.occurrence_count).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn keys_are_camera_and_detector() {
        let alerts = manager();
        let t0 = Instant::now();
        let a = alerts.ingest(event("cam-1", DetectorKind::Motion, t0)).await;
        let b = alerts.ingest(event("cam-2", DetectorKind::Motion, t0)).await;
        let c = alerts.ingest(event("cam-1", DetectorKind::Intrusion, t0)).await;
        assert_eq!(vec![a, b, c], vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn acknowledgement_does_not_block_new_alerts() {
        let alerts = manager();
        let t0 = Instant::now();
        let first = alerts.ingest(event("cam-1", DetectorKind::Motion, t0)).await;
        alerts.acknowledge(first).await.unwrap();
        assert!(alerts.unacknowledged().await.is_empty());

        // still inside the window: the acknowledged incident keeps counting
        assert_eq!(alerts.ingest(event("cam-1", DetectorKind::Motion, t0 + Duration::from_secs(1))).await, first);
        let later = alerts.ingest(event("cam-1", DetectorKind::Motion, t0 + Duration::from_secs(30))).await;
        assert_eq!(later, 2);
        assert_eq!(alerts.unacknowledged().await.len(), 1);
        assert_eq!(alerts.acknowledge(99).await, Err(AlertError::UnknownAlert(99)));
        assert_eq!(alerts.acknowledge(0).await, Err(AlertError::UnknownAlert(0)));
    }

    #[tokio::test]
    async fn severity_escalates_and_events_are_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let alerts = AlertManager::new(Duration::from_secs(5), bus);
        let t0 = Instant::now();

        alerts.ingest(event("cam-3", DetectorKind::Intrusion, t0)).await;
        let mut escalated = event("cam-3", DetectorKind::Intrusion, t0 + Duration::from_secs(1));
        escalated.severity = Severity::Critical;
        alerts.ingest(escalated).await;

        assert!(matches!(rx.recv().await.unwrap(), SystemEvent::AlertRaised(a) if a.id == 1));
        match rx.recv().await.unwrap() {
            SystemEvent::AlertUpdated(a) => {
                assert_eq!(a.occurrence_count, 2);
                assert_eq!(a.severity, Severity::Critical);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn acknowledging_publishes_the_updated_alert_once() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let alerts = AlertManager::new(Duration::from_secs(5), bus);
        let id = alerts.ingest(event("cam-1", DetectorKind::Fire, Instant::now())).await;
        let _raised = rx.recv().await.unwrap();

        alerts.acknowledge(id).await.unwrap();
        alerts.acknowledge(id).await.unwrap();

        match rx.try_recv() {
            Ok(SystemEvent::AlertUpdated(a)) => {
                assert_eq!(a.id, id);
                assert!(a.acknowledged);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
