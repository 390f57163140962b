use crate::error::{CrashDetectorError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Physical sensor kinds the detector understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Acceleration with gravity already removed by platform fusion
    LinearAcceleration,
    /// Raw accelerometer, gravity included
    Accelerometer,
    Gravity,
    Gyroscope,
}

impl SensorKind {
    /// Android `Sensor.TYPE_*` constant
    pub fn android_type(&self) -> i32 {
        match self {
            SensorKind::Accelerometer => 1,
            SensorKind::Gyroscope => 4,
            SensorKind::Gravity => 9,
            SensorKind::LinearAcceleration => 10,
        }
    }

    pub fn from_android_type(code: i32) -> Result<Self> {
        match code {
            1 => Ok(SensorKind::Accelerometer),
            4 => Ok(SensorKind::Gyroscope),
            9 => Ok(SensorKind::Gravity),
            10 => Ok(SensorKind::LinearAcceleration),
            other => Err(CrashDetectorError::UnknownSensor(other)),
        }
    }
}

/// Raw event as delivered by the platform sensor framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub kind: SensorKind,
    pub values: [f64; 3],
    /// Monotonic milliseconds
    pub timestamp_ms: u64,
}

impl SensorEvent {
    pub fn new(kind: SensorKind, values: [f64; 3], timestamp_ms: u64) -> Self {
        Self {
            kind,
            values,
            timestamp_ms,
        }
    }

    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.values[0], self.values[1], self.values[2])
    }
}

/// Which sensors the device actually has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorAvailability {
    pub linear_acceleration: bool,
    pub accelerometer: bool,
    pub gravity: bool,
    pub gyroscope: bool,
}

impl SensorAvailability {
    pub fn all() -> Self {
        Self {
            linear_acceleration: true,
            accelerometer: true,
            gravity: true,
            gyroscope: true,
        }
    }

    /// Sensors to register: fused linear acceleration when present,
    /// otherwise accelerometer + gravity, plus the gyroscope if present.
    pub fn registration_plan(&self) -> Vec<SensorKind> {
        let mut plan = Vec::with_capacity(3);
        if self.linear_acceleration {
            plan.push(SensorKind::LinearAcceleration);
        } else {
            if self.accelerometer {
                plan.push(SensorKind::Accelerometer);
            }
            if self.gravity {
                plan.push(SensorKind::Gravity);
            }
        }
        if self.gyroscope {
            plan.push(SensorKind::Gyroscope);
        }
        plan
    }
}

/// Platform adapter that owns the actual sensor listeners
pub trait SensorSource: Send + Sync {
    fn availability(&self) -> SensorAvailability;

    /// Begin delivering events for `kinds`
    fn register(&self, kinds: &[SensorKind]) -> Result<()>;

    fn unregister_all(&self);
}

/// Normalized output of the sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizedSignal {
    LinearAcceleration(Vector3<f64>),
    Rotation(Vector3<f64>),
}

/// Turns the four raw sensor streams into linear acceleration and rotation.
///
/// Gravity events only update the cached gravity vector; raw accelerometer
/// events have that vector subtracted.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    gravity: Vector3<f64>,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, event: &SensorEvent) -> Option<NormalizedSignal> {
        match event.kind {
            SensorKind::LinearAcceleration => {
                Some(NormalizedSignal::LinearAcceleration(event.vector()))
            }
            SensorKind::Accelerometer => Some(NormalizedSignal::LinearAcceleration(
                event.vector() - self.gravity,
            )),
            SensorKind::Gravity => {
                self.gravity = event.vector();
                None
            }
            SensorKind::Gyroscope => Some(NormalizedSignal::Rotation(event.vector())),
        }
    }

    pub fn reset(&mut self) {
        self.gravity = Vector3::zeros();
    }
}
