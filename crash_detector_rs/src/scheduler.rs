use crate::detector::CooldownTicket;
use std::sync::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type ExpireFn = Box<dyn FnOnce() + Send + 'static>;

/// Runs the deferred AWAIT_RESPONSE -> NORMAL transition.
///
/// At most one expiry is pending; scheduling a new one replaces it.
pub trait CooldownScheduler: Send + Sync {
    fn schedule(&self, ticket: CooldownTicket, expire: ExpireFn);

    fn cancel(&self);
}

/// Wall-clock scheduler backed by an abortable tokio task
pub struct TokioCooldownScheduler {
    handle: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioCooldownScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            pending: Mutex::new(None),
        }
    }
}

impl CooldownScheduler for TokioCooldownScheduler {
    fn schedule(&self, ticket: CooldownTicket, expire: ExpireFn) {
        let delay = ticket.delay();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            expire();
        });

        match self.pending.lock() {
            Ok(mut pending) => {
                if let Some(previous) = pending.replace(task) {
                    previous.abort();
                }
            }
            Err(_) => log::error!("Failed to acquire cooldown timer lock"),
        }
    }

    fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.take() {
                task.abort();
            }
        }
    }
}

/// Scheduler driven by event time, for log replay and tests.
///
/// Nothing fires on its own; call [`ManualCooldownScheduler::fire_due`]
/// as the clock advances.
#[derive(Default)]
pub struct ManualCooldownScheduler {
    pending: Mutex<Option<(CooldownTicket, ExpireFn)>>,
}

impl ManualCooldownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_deadline(&self) -> Option<u64> {
        self.pending
            .lock()
            .ok()
            .and_then(|p| p.as_ref().map(|(ticket, _)| ticket.expires_at))
    }

    /// Run the pending expiry if its deadline is at or before `now_ms`
    pub fn fire_due(&self, now_ms: u64) -> bool {
        let due = match self.pending.lock() {
            Ok(mut pending) => {
                let ready = pending
                    .as_ref()
                    .map_or(false, |(ticket, _)| ticket.expires_at <= now_ms);
                if ready {
                    pending.take()
                } else {
                    None
                }
            }
            Err(_) => None,
        };

        // Expiry locks the detector; run it with our own lock released
        match due {
            Some((_, expire)) => {
                expire();
                true
            }
            None => false,
        }
    }
}

impl CooldownScheduler for ManualCooldownScheduler {
    fn schedule(&self, ticket: CooldownTicket, expire: ExpireFn) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some((ticket, expire));
        }
    }

    fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticket(generation: u64, impact_time: u64) -> CooldownTicket {
        CooldownTicket {
            generation,
            impact_time,
            expires_at: impact_time + 5000,
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> ExpireFn) {
        let fired = Arc::new(AtomicUsize::new(0));
        let make = {
            let fired = fired.clone();
            move || -> ExpireFn {
                let fired = fired.clone();
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                })
            }
        };
        (fired, make)
    }

    #[test]
    fn test_manual_fires_at_deadline() {
        let scheduler = ManualCooldownScheduler::new();
        let (fired, make) = counter();
        scheduler.schedule(ticket(1, 100), make());
        assert_eq!(scheduler.pending_deadline(), Some(5100));

        assert!(!scheduler.fire_due(5099));
        assert!(scheduler.fire_due(5100));
        assert!(!scheduler.fire_due(9000));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_cancel() {
        let scheduler = ManualCooldownScheduler::new();
        let (fired, make) = counter();
        scheduler.schedule(ticket(1, 0), make());
        scheduler.cancel();
        assert!(!scheduler.fire_due(u64::MAX));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_fires_after_delay() {
        let scheduler = TokioCooldownScheduler::new(Handle::current());
        let (fired, make) = counter();
        scheduler.schedule(ticket(1, 0), make());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_reschedule_replaces_pending() {
        let scheduler = TokioCooldownScheduler::new(Handle::current());
        let (fired, make) = counter();
        scheduler.schedule(ticket(1, 0), make());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        scheduler.schedule(ticket(2, 1000), make());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_cancel() {
        let scheduler = TokioCooldownScheduler::new(Handle::current());
        let (fired, make) = counter();
        scheduler.schedule(ticket(1, 0), make());
        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
