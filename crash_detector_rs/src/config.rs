//! Detector tuning constants.
//!
//! Every threshold that is not part of a sensitivity profile lives here.
//! `Default` carries the production values; tests and the replay tool may
//! override individual fields.

use crate::error::{CrashDetectorError, Result};
use serde::{Deserialize, Serialize};

/// Standard gravity in m/s².
pub const GRAVITY: f64 = 9.81;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Retention of both rolling windows, and the longest a free fall may
    /// last before it is discarded as noise.
    pub window_size_ms: u64,

    /// Falls shorter than this are logged as too short. The state
    /// transition does not depend on it.
    pub free_fall_duration_ms: u64,

    /// After a confirmed crash no evaluation happens for this long.
    pub impact_cooldown_ms: u64,

    /// Gyroscope samples younger than this (relative to the candidate
    /// impact) take part in the rotation cross-check.
    pub gyro_correlation_ms: u64,

    /// Low-pass smoothing factor. Range: [0.0, 1.0). Higher = smoother.
    pub low_pass_alpha: f64,

    /// Filtered magnitudes above this are treated as sensor faults.
    pub spike_reject_threshold: f64,

    /// m/s² per g.
    pub gravity: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size_ms: 1000,
            free_fall_duration_ms: 200,
            impact_cooldown_ms: 5000,
            gyro_correlation_ms: 500,
            low_pass_alpha: 0.8,
            spike_reject_threshold: 50.0,
            gravity: GRAVITY,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size_ms == 0 {
            return Err(CrashDetectorError::InvalidConfig(
                "window_size_ms must be positive".to_string(),
            ));
        }
        if self.gyro_correlation_ms > self.window_size_ms {
            return Err(CrashDetectorError::InvalidConfig(format!(
                "gyro_correlation_ms ({}) exceeds window_size_ms ({})",
                self.gyro_correlation_ms, self.window_size_ms
            )));
        }
        if !(0.0..1.0).contains(&self.low_pass_alpha) {
            return Err(CrashDetectorError::InvalidConfig(format!(
                "low_pass_alpha must be in [0, 1), got {}",
                self.low_pass_alpha
            )));
        }
        if !(self.spike_reject_threshold > 0.0) {
            return Err(CrashDetectorError::InvalidConfig(
                "spike_reject_threshold must be positive".to_string(),
            ));
        }
        if !(self.gravity > 0.0) {
            return Err(CrashDetectorError::InvalidConfig(
                "gravity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
