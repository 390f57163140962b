use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One filtered reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
}

impl SensorSample {
    pub fn new(timestamp: u64, x: f64, y: f64, z: f64) -> Self {
        let magnitude = (x * x + y * y + z * z).sqrt();
        Self {
            timestamp,
            x,
            y,
            z,
            magnitude,
        }
    }

    pub fn from_vector(timestamp: u64, v: Vector3<f64>) -> Self {
        Self::new(timestamp, v.x, v.y, v.z)
    }
}

/// Time-bounded buffer of samples, oldest first.
///
/// After every insert, each retained sample satisfies
/// `latest.timestamp - sample.timestamp < duration_ms`.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<SensorSample>,
    duration_ms: u64,
}

impl RollingWindow {
    pub fn new(duration_ms: u64) -> Self {
        RollingWindow {
            samples: VecDeque::with_capacity(256),
            duration_ms,
        }
    }

    /// Add a sample at its time-ordered position, then prune expired ones
    pub fn insert(&mut self, sample: SensorSample) {
        let position = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        if position == self.samples.len() {
            self.samples.push_back(sample);
        } else {
            self.samples.insert(position, sample);
        }

        let Some(latest) = self.latest_timestamp() else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if latest - front.timestamp >= self.duration_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Samples with `reference - sample.timestamp < max_age_ms`.
    ///
    /// Samples newer than `reference` count as age zero.
    pub fn filter_recent(
        &self,
        max_age_ms: u64,
        reference: u64,
    ) -> impl Iterator<Item = &SensorSample> + Clone + '_ {
        self.samples
            .iter()
            .filter(move |s| reference.saturating_sub(s.timestamp) < max_age_ms)
    }

    /// Largest magnitude among recent samples, 0 when there are none
    pub fn max_magnitude(&self, max_age_ms: u64, reference: u64) -> f64 {
        self.filter_recent(max_age_ms, reference)
            .map(|s| s.magnitude)
            .fold(0.0, f64::max)
    }

    pub fn latest_timestamp(&self) -> Option<u64> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
