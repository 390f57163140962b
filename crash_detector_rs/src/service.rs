use crate::crash_event::{CrashEvent, CrashEventBus, CrashEventSubscriber};
use crate::detector::{CooldownTicket, CrashDetector, DetectionState};
use crate::error::{CrashDetectorError, Result};
use crate::live_status::DetectorStatus;
use crate::scheduler::CooldownScheduler;
use crate::sensitivity::SensitivityLevel;
use crate::sensors::{SensorEvent, SensorSource};
use crate::settings::CrashSettings;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

struct Inner {
    detector: CrashDetector,
    running: bool,
}

/// Thread-safe host around a [`CrashDetector`].
///
/// Sensor callbacks, settings updates, lifecycle calls and the cooldown
/// timer may arrive on different threads; all of them go through one
/// mutex.
pub struct CrashDetectionService {
    inner: Arc<Mutex<Inner>>,
    source: Arc<dyn SensorSource>,
    scheduler: Arc<dyn CooldownScheduler>,
    bus: CrashEventBus,
}

impl CrashDetectionService {
    pub fn new(
        detector: CrashDetector,
        source: Arc<dyn SensorSource>,
        scheduler: Arc<dyn CooldownScheduler>,
    ) -> Self {
        CrashDetectionService {
            inner: Arc::new(Mutex::new(Inner {
                detector,
                running: false,
            })),
            source,
            scheduler,
            bus: CrashEventBus::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CrashDetectorError::lock("detector"))
    }

    /// Register sensors and begin detection. No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.running {
            log::warn!("Already running, ignoring start() call");
            return Ok(());
        }

        log::info!(
            "Starting crash detection (Sensitivity: {})",
            inner.detector.sensitivity()
        );

        let availability = self.source.availability();
        if availability.linear_acceleration {
            log::debug!("Using linear acceleration sensor");
        } else if availability.accelerometer && availability.gravity {
            log::debug!("Using accelerometer + gravity fallback");
        } else {
            log::warn!("No usable acceleration source, detection will stay idle");
        }
        if !availability.gyroscope {
            log::warn!("No gyroscope, crashes cannot be confirmed");
        }

        self.source.register(&availability.registration_plan())?;
        inner.running = true;
        inner.detector.reset();
        Ok(())
    }

    /// Unregister sensors and clear detector state. No-op when stopped.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.running {
            return Ok(());
        }

        log::info!("Stopping crash detection");
        self.source.unregister_all();
        self.scheduler.cancel();
        inner.running = false;
        inner.detector.reset();
        Ok(())
    }

    /// Entry point for the platform sensor callback
    pub fn on_sensor_event(&self, event: &SensorEvent) -> Result<Option<CrashEvent>> {
        let confirmation = {
            let mut inner = self.lock()?;
            if !inner.running {
                return Ok(None);
            }
            inner.detector.process(event)
        };

        let Some(confirmation) = confirmation else {
            return Ok(None);
        };

        self.bus.publish(confirmation.event.clone());
        self.schedule_cooldown(confirmation.ticket);
        Ok(Some(confirmation.event))
    }

    fn schedule_cooldown(&self, ticket: CooldownTicket) {
        let inner = Arc::downgrade(&self.inner);
        self.scheduler.schedule(
            ticket,
            Box::new(move || {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                match inner.lock() {
                    Ok(mut inner) => {
                        inner.detector.expire_cooldown(ticket);
                    }
                    Err(_) => log::error!("Failed to acquire detector lock for cooldown"),
                };
            }),
        );
    }

    pub fn update_sensitivity(&self, sensitivity: SensitivityLevel) -> Result<()> {
        self.lock()?.detector.update_sensitivity(sensitivity);
        Ok(())
    }

    /// Apply the sensitivity from `settings` now and on every change,
    /// until the settings source goes away.
    pub async fn follow_sensitivity(self: Arc<Self>, mut settings: watch::Receiver<CrashSettings>) {
        let mut applied = None;
        loop {
            let level = settings.borrow_and_update().sensitivity;
            if applied != Some(level) {
                match self.update_sensitivity(level) {
                    Ok(()) => applied = Some(level),
                    Err(e) => log::error!("Failed to apply sensitivity {}: {}", level, e),
                }
            }
            if settings.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn subscribe(&self) -> CrashEventSubscriber {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &CrashEventBus {
        &self.bus
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.lock()?.running)
    }

    pub fn state(&self) -> Result<DetectionState> {
        Ok(self.lock()?.detector.state())
    }

    pub fn sensitivity(&self) -> Result<SensitivityLevel> {
        Ok(self.lock()?.detector.sensitivity())
    }

    pub fn status(&self) -> Result<DetectorStatus> {
        let inner = self.lock()?;
        Ok(inner.detector.status(inner.running))
    }

    pub fn debug_info(&self) -> Result<String> {
        Ok(self.status()?.to_string())
    }
}
