use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Confirmed crash, handed to the UI layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    /// Monotonic milliseconds of the triggering sample
    pub timestamp: u64,
    pub impact_magnitude: f64,   // g
    pub rotation_magnitude: f64, // rad/s
    pub detection_reason: String,
}

/// Hot broadcast of crash events.
///
/// One pending slot: publishing before a subscriber has consumed the
/// previous event overwrites it, and the publisher never blocks. Every
/// subscriber sees each event it has not been overtaken on.
#[derive(Clone)]
pub struct CrashEventBus {
    tx: broadcast::Sender<CrashEvent>,
}

impl CrashEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Returns the number of subscribers that will observe the event
    pub fn publish(&self, event: CrashEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                log::debug!("Crash event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> CrashEventSubscriber {
        CrashEventSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for CrashEventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CrashEventSubscriber {
    rx: broadcast::Receiver<CrashEvent>,
}

impl CrashEventSubscriber {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<CrashEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Subscriber overtaken, {} event(s) replaced", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for the latest pending event
    pub fn try_recv(&mut self) -> Option<CrashEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
