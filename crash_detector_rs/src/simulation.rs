//! Synthetic ride traces and an in-process sensor source for replaying them.

use crate::config::GRAVITY;
use crate::error::{CrashDetectorError, Result};
use crate::sensors::{SensorAvailability, SensorEvent, SensorKind, SensorSource};
use std::str::FromStr;
use std::sync::Mutex;

const STEP_MS: u64 = 10;
/// Magnitude of the steady signal between incidents
const BASELINE: f64 = 9.8;

/// Sensor source that just remembers what was registered.
///
/// Replays use [`ReplaySource::delivers`] to drop events the platform would
/// never have sent.
pub struct ReplaySource {
    availability: SensorAvailability,
    registered: Mutex<Vec<SensorKind>>,
}

impl ReplaySource {
    pub fn new(availability: SensorAvailability) -> Self {
        Self {
            availability,
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn registered(&self) -> Vec<SensorKind> {
        self.registered
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn delivers(&self, kind: SensorKind) -> bool {
        self.registered
            .lock()
            .map(|r| r.contains(&kind))
            .unwrap_or(false)
    }
}

impl SensorSource for ReplaySource {
    fn availability(&self) -> SensorAvailability {
        self.availability
    }

    fn register(&self, kinds: &[SensorKind]) -> Result<()> {
        let mut registered = self
            .registered
            .lock()
            .map_err(|_| CrashDetectorError::lock("sensor registration"))?;
        *registered = kinds.to_vec();
        Ok(())
    }

    fn unregister_all(&self) {
        if let Ok(mut registered) = self.registered.lock() {
            registered.clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Five seconds of steady riding
    Resting,
    /// Rider tumbles: a 300 ms drop with the phone spinning, then a hard hit
    FreeFallCrash,
    /// One sharp jolt with no rotation
    Pothole,
    /// Collision without a preceding drop, bike rotating as it goes down
    DirectImpact,
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "resting" => Ok(Scenario::Resting),
            "free-fall-crash" => Ok(Scenario::FreeFallCrash),
            "pothole" => Ok(Scenario::Pothole),
            "direct-impact" => Ok(Scenario::DirectImpact),
            other => Err(format!(
                "unknown scenario '{}' (resting, free-fall-crash, pothole, direct-impact)",
                other
            )),
        }
    }
}

struct TraceBuilder {
    events: Vec<SensorEvent>,
    t: u64,
    accel_and_gravity: bool,
}

impl TraceBuilder {
    fn new(accel_and_gravity: bool) -> Self {
        Self {
            events: Vec::new(),
            t: 0,
            accel_and_gravity,
        }
    }

    /// One tick: a linear-acceleration reading plus a gyroscope reading
    fn step(&mut self, linear: [f64; 3], rotation: [f64; 3]) {
        if self.accel_and_gravity {
            let gravity = [0.0, 0.0, GRAVITY];
            self.events
                .push(SensorEvent::new(SensorKind::Gravity, gravity, self.t));
            let raw = [linear[0], linear[1], linear[2] + GRAVITY];
            self.events
                .push(SensorEvent::new(SensorKind::Accelerometer, raw, self.t));
        } else {
            self.events
                .push(SensorEvent::new(SensorKind::LinearAcceleration, linear, self.t));
        }
        self.events
            .push(SensorEvent::new(SensorKind::Gyroscope, rotation, self.t));
        self.t += STEP_MS;
    }

    fn riding(&mut self, duration_ms: u64) {
        let end = self.t + duration_ms;
        while self.t < end {
            let phase = self.t as f64 / 1000.0 * std::f64::consts::TAU;
            self.step(
                [(phase * 2.0).sin() * 0.3, phase.cos() * 0.2, BASELINE],
                [phase.sin() * 0.05, 0.0, phase.cos() * 0.05],
            );
        }
    }

    fn hold(&mut self, duration_ms: u64, linear: [f64; 3], rotation: [f64; 3]) {
        let end = self.t + duration_ms;
        while self.t < end {
            self.step(linear, rotation);
        }
    }

    fn finish(self) -> Vec<SensorEvent> {
        self.events
    }
}

impl Scenario {
    /// Events at 100 Hz. With `accel_and_gravity` the acceleration is
    /// emitted as raw accelerometer + gravity instead of linear acceleration.
    pub fn events(&self, accel_and_gravity: bool) -> Vec<SensorEvent> {
        let mut trace = TraceBuilder::new(accel_and_gravity);
        let calm = [0.02, 0.0, 0.03];
        match self {
            Scenario::Resting => trace.riding(5000),
            Scenario::FreeFallCrash => {
                let tumbling = [6.0, 5.0, 3.0];
                trace.riding(1000);
                trace.hold(300, [0.1, 0.1, 0.1], tumbling);
                trace.step([0.0, 0.0, 200.0], tumbling);
                trace.step([0.0, 0.0, 60.0], tumbling);
                trace.step([0.0, 0.0, 30.0], [2.0, 1.0, 0.5]);
                trace.hold(500, [0.0, 0.0, 1.0], calm);
                trace.riding(6000);
            }
            Scenario::Pothole => {
                trace.riding(1000);
                trace.step([0.0, 0.0, 200.0], calm);
                trace.riding(2000);
            }
            Scenario::DirectImpact => {
                let rolling = [7.0, 0.0, 0.0];
                trace.riding(1000);
                trace.hold(200, [0.3, 0.2, BASELINE], rolling);
                trace.step([0.0, 0.0, 200.0], rolling);
                trace.hold(500, [0.0, 0.0, 1.0], calm);
                trace.riding(6000);
            }
        }
        trace.finish()
    }
}
