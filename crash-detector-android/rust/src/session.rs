use crate::error::{BridgeError, JResult};
use crate::sensor_receiver::AndroidSensorSource;
use crash_detector_rs::{
    AppVisibilityObserver, CrashDetectionService, CrashDetector, CrashEvent, CrashEventSubscriber,
    CrashSettings, CrashSettingsRepository, SensitivityLevel, SensorAvailability,
    TokioCooldownScheduler,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Everything the app process needs for crash detection.
///
/// Created once from `nativeInit` and kept for the lifetime of the process.
/// Owns the runtime that drives cooldown timers and settings watchers.
pub struct DetectionSession {
    runtime: Runtime,
    settings: CrashSettingsRepository,
    source: Arc<AndroidSensorSource>,
    service: Arc<CrashDetectionService>,
    observer: AppVisibilityObserver,
    events: Mutex<CrashEventSubscriber>,
    sensitivity_task: JoinHandle<()>,
}

impl DetectionSession {
    /// `settings_path` of `None` keeps settings in memory only
    pub fn new(settings_path: Option<PathBuf>, availability: SensorAvailability) -> JResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("crash-detector")
            .enable_time()
            .build()
            .map_err(|e| BridgeError::Internal(format!("Failed to start runtime: {}", e)))?;

        let settings = match settings_path {
            Some(path) => CrashSettingsRepository::open(path)?,
            None => CrashSettingsRepository::in_memory(CrashSettings::default()),
        };
        let initial = settings.current();
        log::info!(
            "Initializing crash detection (Sensitivity: {}, enabled: {})",
            initial.sensitivity,
            initial.detection_enabled
        );

        let source = Arc::new(AndroidSensorSource::new(availability));
        let scheduler = Arc::new(TokioCooldownScheduler::new(runtime.handle().clone()));
        let service = Arc::new(CrashDetectionService::new(
            CrashDetector::new(initial.sensitivity),
            source.clone(),
            scheduler,
        ));
        let events = Mutex::new(service.subscribe());

        let sensitivity_task =
            runtime.spawn(service.clone().follow_sensitivity(settings.subscribe()));
        let observer = AppVisibilityObserver::new(
            service.clone(),
            settings.subscribe(),
            runtime.handle().clone(),
        );

        Ok(DetectionSession {
            runtime,
            settings,
            source,
            service,
            observer,
            events,
            sensitivity_task,
        })
    }

    pub fn on_foreground(&self) -> JResult<()> {
        Ok(self.observer.on_foreground()?)
    }

    pub fn on_background(&self) -> JResult<()> {
        Ok(self.observer.on_background()?)
    }

    /// Feed one `onSensorChanged` callback. Returns the crash it confirmed, if any.
    pub fn push_sensor_event(
        &self,
        sensor_type: i32,
        values: [f32; 3],
        timestamp_ms: i64,
    ) -> JResult<Option<CrashEvent>> {
        match self.source.receive(sensor_type, values, timestamp_ms)? {
            Some(event) => Ok(self.service.on_sensor_event(&event)?),
            None => Ok(None),
        }
    }

    pub fn set_sensitivity(&self, name: &str) -> JResult<()> {
        let level: SensitivityLevel = name.parse()?;
        self.settings.set_sensitivity_level(level)?;
        // The watcher would get there too; apply now so the next sample sees it
        self.service.update_sensitivity(level)?;
        Ok(())
    }

    pub fn set_detection_enabled(&self, enabled: bool) -> JResult<()> {
        Ok(self.settings.set_detection_enabled(enabled)?)
    }

    pub fn registered_sensors(&self) -> JResult<Vec<i32>> {
        self.source.registered_types()
    }

    /// Latest crash event not yet taken by the host, as JSON
    pub fn poll_crash_event(&self) -> JResult<Option<String>> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| BridgeError::Internal("Failed to acquire event lock".to_string()))?;
        events
            .try_recv()
            .map(|event| serde_json::to_string(&event))
            .transpose()
            .map_err(|e| BridgeError::Internal(format!("JSON serialization failed: {}", e)))
    }

    pub fn debug_info(&self) -> JResult<String> {
        Ok(self.service.debug_info()?)
    }

    pub fn settings(&self) -> CrashSettings {
        self.settings.current()
    }

    pub fn is_running(&self) -> JResult<bool> {
        Ok(self.service.is_running()?)
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        self.sensitivity_task.abort();
        if let Err(e) = self.observer.on_background() {
            log::warn!("Failed to stop detection on shutdown: {}", e);
        }
        log::debug!("Crash detection session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    const LINEAR: i32 = 10;
    const GYRO: i32 = 4;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_lifecycle_follows_visibility() {
        let session = DetectionSession::new(None, SensorAvailability::all()).unwrap();
        assert!(!session.is_running().unwrap());
        assert!(session.registered_sensors().unwrap().is_empty());

        session.on_foreground().unwrap();
        assert!(session.is_running().unwrap());
        assert_eq!(session.registered_sensors().unwrap(), vec![LINEAR, GYRO]);

        session.on_background().unwrap();
        assert!(!session.is_running().unwrap());
        assert!(session.registered_sensors().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_sensors_registered() {
        let availability = SensorAvailability {
            linear_acceleration: false,
            ..SensorAvailability::all()
        };
        let session = DetectionSession::new(None, availability).unwrap();
        session.on_foreground().unwrap();
        assert_eq!(session.registered_sensors().unwrap(), vec![1, 9, 4]);
    }

    #[test]
    fn test_crash_is_polled_once() {
        let session = DetectionSession::new(None, SensorAvailability::all()).unwrap();
        session.on_foreground().unwrap();

        // One smoothing step from rest: 0.2 * 30 = 6 rad/s, 0.2 * 200 = 40 m/s²
        assert!(session
            .push_sensor_event(GYRO, [0.0, 30.0, 0.0], 1000)
            .unwrap()
            .is_none());
        let crash = session
            .push_sensor_event(LINEAR, [0.0, 0.0, 200.0], 1005)
            .unwrap()
            .unwrap();
        assert_eq!(crash.detection_reason, "Direct Impact");

        let json = session.poll_crash_event().unwrap().unwrap();
        assert!(json.contains("\"detection_reason\":\"Direct Impact\""));
        assert!(session.poll_crash_event().unwrap().is_none());
    }

    #[test]
    fn test_nan_from_driver_is_ignored() {
        let session = DetectionSession::new(None, SensorAvailability::all()).unwrap();
        session.on_foreground().unwrap();

        assert!(session
            .push_sensor_event(LINEAR, [f32::NAN, 0.0, 0.0], 900)
            .unwrap()
            .is_none());
        session.push_sensor_event(GYRO, [0.0, 30.0, 0.0], 1000).unwrap();
        let crash = session.push_sensor_event(LINEAR, [0.0, 0.0, 200.0], 1005).unwrap();
        assert!(crash.is_some());
    }

    #[test]
    fn test_events_dropped_in_background() {
        let session = DetectionSession::new(None, SensorAvailability::all()).unwrap();
        assert!(session
            .push_sensor_event(LINEAR, [0.0, 0.0, 9.8], 0)
            .unwrap()
            .is_none());
        assert!(session.debug_info().unwrap().contains("Samples: 0"));
    }

    #[test]
    fn test_settings_drive_detection() {
        let session = DetectionSession::new(None, SensorAvailability::all()).unwrap();
        session.on_foreground().unwrap();

        session.set_detection_enabled(false).unwrap();
        assert!(wait_until(|| !session.is_running().unwrap()));
        session.set_detection_enabled(true).unwrap();
        assert!(wait_until(|| session.is_running().unwrap()));

        session.set_sensitivity("HIGH").unwrap();
        assert_eq!(session.settings().sensitivity, SensitivityLevel::High);
        assert!(session.debug_info().unwrap().contains("Sensitivity: HIGH"));
        assert!(session.set_sensitivity("LOUD").is_err());
    }

    #[test]
    fn test_settings_persist_across_sessions() {
        let dir = std::env::temp_dir().join(format!("crash_jni_{}", std::process::id()));
        let path = dir.join("crash_settings.json");
        {
            let session =
                DetectionSession::new(Some(path.clone()), SensorAvailability::all()).unwrap();
            session.set_sensitivity("LOW").unwrap();
            session.set_detection_enabled(false).unwrap();
        }
        let session = DetectionSession::new(Some(path), SensorAvailability::all()).unwrap();
        assert_eq!(
            session.settings(),
            CrashSettings {
                sensitivity: SensitivityLevel::Low,
                detection_enabled: false,
            }
        );
        session.on_foreground().unwrap();
        assert!(!session.is_running().unwrap());
        let _ = std::fs::remove_dir_all(dir);
    }
}
