use crate::camera::video_decoder::FrameGrabber;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

/// Why a gated open produced no grabber in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatedOpenError {
    /// The decoder said no.
    Refused(String),
    /// Nothing came back within the timeout. The decoder call may still be running;
    /// it keeps the source's slot until it returns.
    TimedOut,
}

/// Allows at most one decoder open per source (device index or URL) at a time.
///
/// A blocking open cannot be cancelled. When the caller gives up on one, the open
/// keeps running on the blocking pool, keeps the slot, and whatever grabber it
/// eventually yields is released instead of leaking. A retry for the same source
/// waits for that slot first.
#[derive(Clone, Default)]
pub struct OpenGate {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl OpenGate {
    pub fn new() -> Self {
        OpenGate::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Runs `open` on the blocking pool once the slot for `key` is free. Waiting for
    /// the slot counts against `timeout`.
    pub async fn open<F>(&self, key: &str, timeout: Duration, open: F) -> Result<Box<dyn FrameGrabber>, GatedOpenError>
    where
        F: FnOnce() -> Result<Box<dyn FrameGrabber>, String> + Send + 'static,
    {
        let slot = self.slot(key);
        let task_key = key.to_string();

        let attempt = async move {
            let guard = slot.lock_owned().await;
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let _guard = guard;
                let result = match tokio::task::spawn_blocking(open).await {
                    Ok(result) => result,
                    Err(join_err) => Err(format!("decoder open panicked: {}", join_err)),
                };
                // Nobody is waiting any more: give the grabber straight back.
                if let Err(Ok(mut grabber)) = tx.send(result) {
                    warn!("♻️ Releasing late grabber for '{}' after its open was abandoned.", task_key);
                    grabber.release();
                }
            });
            rx.await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(Ok(grabber))) => Ok(grabber),
            Ok(Ok(Err(details))) => Err(GatedOpenError::Refused(details)),
            Ok(Err(_)) => Err(GatedOpenError::Refused("open task ended without a result".to_string())),
            Err(_) => {
                debug!("Open of '{}' abandoned after {:?}.", key, timeout);
                Err(GatedOpenError::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGrabber {
        releases: Arc<AtomicUsize>,
    }

    impl FrameGrabber for CountingGrabber {
        fn grab(&mut self) -> Result<Option<RgbImage>, String> {
            Ok(None)
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn quick_open_hands_back_the_grabber() {
        let gate = OpenGate::new();
        let releases = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&releases);
        let grabber = gate
            .open("device:0", Duration::from_secs(1), move || {
                Ok(Box::new(CountingGrabber { releases: r }) as Box<dyn FrameGrabber>)
            })
            .await;
        assert!(grabber.is_ok());
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refusal_is_reported_with_its_reason() {
        let gate = OpenGate::new();
        let result = gate.open("rtsp://x", Duration::from_secs(1), || Err("401 unauthorized".to_string())).await;
        assert_eq!(result.err(), Some(GatedOpenError::Refused("401 unauthorized".to_string())));
    }

    #[tokio::test]
    async fn abandoned_open_is_released_when_it_finally_returns() {
        let gate = OpenGate::new();
        let releases = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&releases);
        let result = gate
            .open("device:3", Duration::from_millis(20), move || {
                std::thread::sleep(Duration::from_millis(100));
                Ok(Box::new(CountingGrabber { releases: r }) as Box<dyn FrameGrabber>)
            })
            .await;
        assert_eq!(result.err(), Some(GatedOpenError::TimedOut));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
