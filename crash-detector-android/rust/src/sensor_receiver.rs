use crate::error::{BridgeError, JResult};
use crash_detector_rs::error::CrashDetectorError;
use crash_detector_rs::{SensorAvailability, SensorEvent, SensorKind, SensorSource};
use std::sync::Mutex;

/// Sensor source backed by the Android `SensorManager` on the Kotlin side.
///
/// Rust decides which sensors are needed; Kotlin reads the plan through
/// `getRegisteredSensors()` and forwards matching `SensorEvent`s.
pub struct AndroidSensorSource {
    availability: SensorAvailability,
    registered: Mutex<Vec<SensorKind>>,
}

impl AndroidSensorSource {
    pub fn new(availability: SensorAvailability) -> Self {
        Self {
            availability,
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Android sensor type codes the host should currently listen to
    pub fn registered_types(&self) -> JResult<Vec<i32>> {
        let registered = self
            .registered
            .lock()
            .map_err(|_| BridgeError::Internal("Failed to acquire sensor lock".to_string()))?;
        Ok(registered.iter().map(|k| k.android_type()).collect())
    }

    /// Convert one callback from `onSensorChanged`.
    ///
    /// Events from sensors we never asked for are dropped (`None`); they show
    /// up briefly after unregistering.
    pub fn receive(
        &self,
        sensor_type: i32,
        values: [f32; 3],
        timestamp_ms: i64,
    ) -> JResult<Option<SensorEvent>> {
        let kind = SensorKind::from_android_type(sensor_type)?;
        if timestamp_ms < 0 {
            return Err(BridgeError::InvalidParameters(format!(
                "negative timestamp {}",
                timestamp_ms
            )));
        }

        let registered = self
            .registered
            .lock()
            .map_err(|_| BridgeError::Internal("Failed to acquire sensor lock".to_string()))?;
        if !registered.contains(&kind) {
            return Ok(None);
        }

        Ok(Some(SensorEvent::new(
            kind,
            values.map(f64::from),
            timestamp_ms as u64,
        )))
    }
}

impl SensorSource for AndroidSensorSource {
    fn availability(&self) -> SensorAvailability {
        self.availability
    }

    fn register(&self, kinds: &[SensorKind]) -> crash_detector_rs::Result<()> {
        let mut registered = self
            .registered
            .lock()
            .map_err(|_| {
                CrashDetectorError::Internal("Failed to acquire sensor lock".to_string())
            })?;
        for kind in kinds {
            log::debug!("Registering {:?} (type {})", kind, kind.android_type());
        }
        *registered = kinds.to_vec();
        Ok(())
    }

    fn unregister_all(&self) {
        if let Ok(mut registered) = self.registered.lock() {
            registered.clear();
        }
    }
}
