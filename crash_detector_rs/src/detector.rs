//! Crash state machine.
//!
//! Consumes raw sensor events, low-pass filters them, keeps one second of
//! acceleration and rotation history, and classifies the acceleration
//! magnitude stream:
//!
//! ```text
//! NORMAL --(|a| < free fall)--> POTENTIAL_FALL --(|a| > impact)--> crash check --> NORMAL
//!    |                              |--(fall ended / timed out)--> NORMAL
//!    '--(|a| > impact)--> crash check --(confirmed)--> AWAIT_RESPONSE --(cooldown)--> NORMAL
//! ```
//!
//! A candidate impact is only confirmed when the gyroscope saw enough
//! rotation in the preceding 500 ms. The detector is synchronous and owns
//! all of its state; the cooldown expiry is handed back to the caller as a
//! [`CooldownTicket`] to be scheduled.

use crate::config::DetectorConfig;
use crate::crash_event::CrashEvent;
use crate::error::Result;
use crate::filter::{is_spike, LowPassFilter};
use crate::live_status::DetectorStatus;
use crate::sensitivity::SensitivityLevel;
use crate::sensors::{NormalizedSignal, Sampler, SensorEvent};
use crate::window::{RollingWindow, SensorSample};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    Normal,
    PotentialFall,
    /// Transient; the crash check runs inline so this is never held
    Impact,
    AwaitResponse,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionState::Normal => "NORMAL",
            DetectionState::PotentialFall => "POTENTIAL_FALL",
            DetectionState::Impact => "IMPACT",
            DetectionState::AwaitResponse => "AWAIT_RESPONSE",
        };
        f.write_str(name)
    }
}

/// Identifies one crash episode's cooldown.
///
/// Only the ticket of the most recent episode can move the detector out of
/// `AWAIT_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownTicket {
    pub generation: u64,
    pub impact_time: u64,
    pub expires_at: u64,
}

impl CooldownTicket {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(self.impact_time))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrashConfirmation {
    pub event: CrashEvent,
    pub ticket: CooldownTicket,
}

pub struct CrashDetector {
    config: DetectorConfig,
    sensitivity: SensitivityLevel,

    sampler: Sampler,
    accel_filter: LowPassFilter,
    gyro_filter: LowPassFilter,
    accel_window: RollingWindow,
    gyro_window: RollingWindow,

    state: DetectionState,
    free_fall_start: u64,
    last_impact_time: Option<u64>,
    generation: u64,

    sample_count: u64,
    crash_count: u64,
}

impl CrashDetector {
    pub fn new(sensitivity: SensitivityLevel) -> Self {
        Self::build(DetectorConfig::default(), sensitivity)
    }

    pub fn with_config(config: DetectorConfig, sensitivity: SensitivityLevel) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, sensitivity))
    }

    fn build(config: DetectorConfig, sensitivity: SensitivityLevel) -> Self {
        CrashDetector {
            sampler: Sampler::new(),
            accel_filter: LowPassFilter::new(config.low_pass_alpha),
            gyro_filter: LowPassFilter::new(config.low_pass_alpha),
            accel_window: RollingWindow::new(config.window_size_ms),
            gyro_window: RollingWindow::new(config.window_size_ms),
            config,
            sensitivity,
            state: DetectionState::Normal,
            free_fall_start: 0,
            last_impact_time: None,
            generation: 0,
            sample_count: 0,
            crash_count: 0,
        }
    }

    /// Feed one raw sensor event. Returns a confirmation when this event
    /// completed a crash signature.
    pub fn process(&mut self, event: &SensorEvent) -> Option<CrashConfirmation> {
        // Filter memory and the gravity cache must never hold NaN/inf
        if !event.values.iter().all(|v| v.is_finite()) {
            log::warn!(
                "Non-finite {:?} reading dropped at {}ms: {:?}",
                event.kind,
                event.timestamp_ms,
                event.values
            );
            return None;
        }

        match self.sampler.normalize(event)? {
            NormalizedSignal::LinearAcceleration(raw) => {
                self.process_acceleration(raw, event.timestamp_ms)
            }
            NormalizedSignal::Rotation(raw) => {
                self.process_rotation(raw, event.timestamp_ms);
                None
            }
        }
    }

    fn process_acceleration(&mut self, raw: Vector3<f64>, now: u64) -> Option<CrashConfirmation> {
        let sample = SensorSample::from_vector(now, self.accel_filter.apply(raw));

        if is_spike(sample.magnitude, self.config.spike_reject_threshold) {
            log::warn!("Spike rejected: |a|={:.2} m/s²", sample.magnitude);
            return None;
        }

        self.accel_window.insert(sample);

        self.sample_count += 1;
        if self.sample_count % 50 == 0 {
            log::trace!(
                "Linear accel: |a|={:.2} m/s² (samples: {})",
                sample.magnitude,
                self.sample_count
            );
        }

        self.analyze(sample.magnitude, now)
    }

    fn process_rotation(&mut self, raw: Vector3<f64>, now: u64) {
        let sample = SensorSample::from_vector(now, self.gyro_filter.apply(raw));
        if is_spike(sample.magnitude, self.config.spike_reject_threshold) {
            return;
        }
        self.gyro_window.insert(sample);
    }

    fn in_cooldown(&self, now: u64) -> bool {
        self.last_impact_time
            .map_or(false, |t| now.saturating_sub(t) < self.config.impact_cooldown_ms)
    }

    fn analyze(&mut self, magnitude: f64, now: u64) -> Option<CrashConfirmation> {
        if self.in_cooldown(now) {
            return None;
        }

        let impact_threshold = self.sensitivity.impact_threshold() * self.config.gravity;
        let free_fall_threshold = self.sensitivity.free_fall_threshold() * self.config.gravity;

        match self.state {
            DetectionState::Normal => {
                if magnitude < free_fall_threshold {
                    self.free_fall_start = now;
                    self.state = DetectionState::PotentialFall;
                    log::debug!("Potential free fall detected: |a|={:.2} m/s²", magnitude);
                    None
                } else if magnitude > impact_threshold {
                    self.check_crash(magnitude, now, "Direct Impact".to_string())
                } else {
                    None
                }
            }

            DetectionState::PotentialFall => {
                let fall_duration = now.saturating_sub(self.free_fall_start);

                if magnitude > impact_threshold {
                    log::debug!("Free fall -> impact, fall lasted {}ms", fall_duration);
                    let confirmation = self.check_crash(
                        magnitude,
                        now,
                        format!("Free Fall + Impact ({}ms)", fall_duration),
                    );
                    // Leaves POTENTIAL_FALL whether or not the check confirmed;
                    // the cooldown guard still covers a confirmed episode.
                    self.state = DetectionState::Normal;
                    confirmation
                } else if magnitude < free_fall_threshold {
                    if fall_duration > self.config.window_size_ms {
                        log::debug!("Free fall timeout, resetting");
                        self.state = DetectionState::Normal;
                    }
                    None
                } else {
                    if fall_duration < self.config.free_fall_duration_ms {
                        log::trace!("False free fall (too short: {}ms), resetting", fall_duration);
                    }
                    self.state = DetectionState::Normal;
                    None
                }
            }

            DetectionState::Impact | DetectionState::AwaitResponse => None,
        }
    }

    fn check_crash(
        &mut self,
        impact_magnitude: f64,
        now: u64,
        reason: String,
    ) -> Option<CrashConfirmation> {
        let max_gyro = self
            .gyro_window
            .max_magnitude(self.config.gyro_correlation_ms, now);
        let impact_threshold = self.sensitivity.impact_threshold() * self.config.gravity;
        let rotation_threshold = self.sensitivity.rotation_threshold();

        log::debug!(
            "Checking crash: impact={:.2}g, max gyro={:.2} rad/s",
            impact_magnitude / self.config.gravity,
            max_gyro
        );

        if !(impact_magnitude > impact_threshold && max_gyro > rotation_threshold) {
            log::debug!(
                "Not a crash (gyro={:.2} vs {:.2} rad/s, impact={:.2} vs {:.2} m/s²)",
                max_gyro,
                rotation_threshold,
                impact_magnitude,
                impact_threshold
            );
            return None;
        }

        self.crash_count += 1;
        log::error!("CRASH DETECTED #{}! Reason: {}", self.crash_count, reason);

        let event = CrashEvent {
            timestamp: now,
            impact_magnitude: impact_magnitude / self.config.gravity,
            rotation_magnitude: max_gyro,
            detection_reason: reason,
        };

        self.last_impact_time = Some(now);
        self.generation += 1;
        self.state = DetectionState::AwaitResponse;

        Some(CrashConfirmation {
            event,
            ticket: CooldownTicket {
                generation: self.generation,
                impact_time: now,
                expires_at: now.saturating_add(self.config.impact_cooldown_ms),
            },
        })
    }

    /// Timer callback for a confirmed episode. Stale tickets are ignored.
    pub fn expire_cooldown(&mut self, ticket: CooldownTicket) -> bool {
        if self.state != DetectionState::AwaitResponse || ticket.generation != self.generation {
            return false;
        }
        self.state = DetectionState::Normal;
        log::debug!("Cooldown finished, back to NORMAL state");
        true
    }

    /// Takes effect on the next evaluated sample; state is untouched.
    pub fn update_sensitivity(&mut self, sensitivity: SensitivityLevel) {
        self.sensitivity = sensitivity;
        log::debug!("Sensitivity updated to: {}", sensitivity);
    }

    /// Clear buffers, filter memory and the state machine.
    ///
    /// Sensitivity, counters and the last impact time survive.
    pub fn reset(&mut self) {
        self.accel_window.clear();
        self.gyro_window.clear();
        self.accel_filter.reset();
        self.gyro_filter.reset();
        self.sampler.reset();
        self.state = DetectionState::Normal;
        self.free_fall_start = 0;
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn sensitivity(&self) -> SensitivityLevel {
        self.sensitivity
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn last_impact_time(&self) -> Option<u64> {
        self.last_impact_time
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn crash_count(&self) -> u64 {
        self.crash_count
    }

    pub fn buffer_sizes(&self) -> (usize, usize) {
        (self.accel_window.len(), self.gyro_window.len())
    }

    pub fn status(&self, running: bool) -> DetectorStatus {
        let (accel_buffer_len, gyro_buffer_len) = self.buffer_sizes();
        DetectorStatus {
            captured_at: chrono::Utc::now().to_rfc3339(),
            running,
            sample_count: self.sample_count,
            crash_count: self.crash_count,
            state: self.state,
            sensitivity: self.sensitivity,
            accel_buffer_len,
            gyro_buffer_len,
            last_impact_time: self.last_impact_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorKind;
    use approx::assert_relative_eq;

    /// Detector without smoothing so each test sample lands verbatim
    fn unfiltered(sensitivity: SensitivityLevel) -> CrashDetector {
        let config = DetectorConfig {
            low_pass_alpha: 0.0,
            ..DetectorConfig::default()
        };
        CrashDetector::with_config(config, sensitivity).unwrap()
    }

    fn accel(magnitude: f64, t: u64) -> SensorEvent {
        SensorEvent::new(SensorKind::LinearAcceleration, [0.0, 0.0, magnitude], t)
    }

    fn gyro(magnitude: f64, t: u64) -> SensorEvent {
        SensorEvent::new(SensorKind::Gyroscope, [magnitude, 0.0, 0.0], t)
    }

    #[test]
    fn test_initial_state() {
        let detector = CrashDetector::new(SensitivityLevel::Medium);
        assert_eq!(detector.state(), DetectionState::Normal);
        assert_eq!(detector.last_impact_time(), None);
        assert_eq!(detector.buffer_sizes(), (0, 0));
    }

    #[test]
    fn test_free_fall_enters_potential_fall() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        assert!(detector.process(&accel(2.0, 10)).is_none());
        assert_eq!(detector.state(), DetectionState::PotentialFall);
    }

    #[test]
    fn test_fall_ending_without_impact_returns_to_normal() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&accel(2.0, 0));
        detector.process(&accel(9.0, 50));
        assert_eq!(detector.state(), DetectionState::Normal);
    }

    #[test]
    fn test_free_fall_timeout() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        let mut t = 0;
        detector.process(&accel(1.0, t));
        while t <= 1000 {
            t += 20;
            assert!(detector.process(&accel(1.0, t)).is_none());
            if t <= 1000 {
                assert_eq!(detector.state(), DetectionState::PotentialFall);
            }
        }
        // t = 1020: the fall outlived the window
        assert_eq!(detector.state(), DetectionState::Normal);
        assert_eq!(detector.crash_count(), 0);
    }

    #[test]
    fn test_direct_impact_confirmed() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(5.5, 90));
        let confirmation = detector.process(&accel(45.0, 100)).unwrap();

        assert_eq!(confirmation.event.detection_reason, "Direct Impact");
        assert_relative_eq!(confirmation.event.impact_magnitude, 45.0 / 9.81, epsilon = 1e-9);
        assert_relative_eq!(confirmation.event.rotation_magnitude, 5.5, epsilon = 1e-9);
        assert_eq!(confirmation.ticket.expires_at, 5100);
        assert_eq!(detector.state(), DetectionState::AwaitResponse);
        assert_eq!(detector.last_impact_time(), Some(100));
    }

    #[test]
    fn test_impact_without_rotation_rejected() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(5.0, 90));
        // Equal to the threshold is not above it
        assert!(detector.process(&accel(45.0, 100)).is_none());
        assert_eq!(detector.state(), DetectionState::Normal);
        assert_eq!(detector.last_impact_time(), None);
    }

    #[test]
    fn test_stale_gyro_is_ignored() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(8.0, 0));
        assert!(detector.process(&accel(45.0, 500)).is_none());
    }

    #[test]
    fn test_missing_gyroscope_never_confirms() {
        let mut detector = unfiltered(SensitivityLevel::High);
        for t in 0..20 {
            assert!(detector.process(&accel(49.0, t * 10)).is_none());
        }
    }

    #[test]
    fn test_cooldown_suppresses_evaluation() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(6.0, 0));
        assert!(detector.process(&accel(45.0, 10)).is_some());
        detector.expire_cooldown(CooldownTicket {
            generation: 1,
            impact_time: 10,
            expires_at: 5010,
        });
        assert_eq!(detector.state(), DetectionState::Normal);

        // Even in NORMAL, nothing is evaluated until the cooldown passes
        detector.process(&gyro(6.0, 4000));
        assert!(detector.process(&accel(45.0, 4009)).is_none());
        assert!(detector.process(&accel(1.0, 4500)).is_none());
        assert_eq!(detector.state(), DetectionState::Normal);

        detector.process(&gyro(6.0, 5005));
        assert!(detector.process(&accel(45.0, 5010)).is_some());
        assert_eq!(detector.crash_count(), 2);
    }

    #[test]
    fn test_stale_ticket_does_not_clear_newer_episode() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(6.0, 0));
        let first = detector.process(&accel(45.0, 10)).unwrap().ticket;

        detector.process(&gyro(6.0, 6000));
        let second = detector.process(&accel(45.0, 6010));
        // Timer of the first episode never ran, state is still AWAIT_RESPONSE
        assert!(second.is_none());

        assert!(detector.expire_cooldown(first));
        detector.process(&gyro(6.0, 6100));
        let second = detector.process(&accel(45.0, 6110)).unwrap().ticket;

        assert!(!detector.expire_cooldown(first));
        assert_eq!(detector.state(), DetectionState::AwaitResponse);
        assert!(detector.expire_cooldown(second));
        assert_eq!(detector.state(), DetectionState::Normal);
    }

    #[test]
    fn test_free_fall_crash_returns_to_normal() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&accel(2.0, 0));
        detector.process(&gyro(6.0, 140));
        let confirmation = detector.process(&accel(40.0, 150)).unwrap();
        assert_eq!(confirmation.event.detection_reason, "Free Fall + Impact (150ms)");
        assert_eq!(detector.state(), DetectionState::Normal);
        assert!(!detector.expire_cooldown(confirmation.ticket));
    }

    #[test]
    fn test_spike_is_dropped() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(6.0, 0));
        assert!(detector.process(&accel(60.0, 10)).is_none());
        assert_eq!(detector.buffer_sizes(), (0, 1));
        assert_eq!(detector.sample_count(), 0);
    }

    #[test]
    fn test_non_finite_reading_does_not_poison_filter() {
        let mut detector = CrashDetector::new(SensitivityLevel::Medium);
        for i in 0..50 {
            detector.process(&accel(9.8, i * 10));
        }
        let glitch = SensorEvent::new(SensorKind::LinearAcceleration, [f64::NAN, 0.0, 0.0], 500);
        assert!(detector.process(&glitch).is_none());
        let inf = SensorEvent::new(SensorKind::Gyroscope, [0.0, f64::INFINITY, 0.0], 500);
        assert!(detector.process(&inf).is_none());
        let gravity = SensorEvent::new(SensorKind::Gravity, [f64::NAN, 0.0, 9.81], 500);
        assert!(detector.process(&gravity).is_none());
        assert_eq!(detector.buffer_sizes(), (50, 0));

        let mut hits = 0;
        let mut t = 510;
        while t < 810 {
            detector.process(&gyro(30.0, t));
            if detector.process(&accel(45.0, t)).is_some() {
                hits += 1;
            }
            t += 10;
        }
        assert_eq!(hits, 1);
        assert_eq!(detector.crash_count(), 1);
    }

    #[test]
    fn test_impact_near_end_of_clock_does_not_overflow() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        let now = u64::MAX - 10;
        detector.process(&gyro(6.0, now - 5));
        let confirmation = detector.process(&accel(45.0, now)).unwrap();
        assert_eq!(confirmation.ticket.expires_at, u64::MAX);
        assert!(detector.expire_cooldown(confirmation.ticket));
    }

    #[test]
    fn test_sensitivity_change_keeps_state() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&accel(2.0, 0));
        detector.update_sensitivity(SensitivityLevel::Low);
        assert_eq!(detector.state(), DetectionState::PotentialFall);
        assert_eq!(detector.sensitivity(), SensitivityLevel::Low);

        // 40 m/s² is ~4.08g, below LOW's 4.5g impact threshold
        detector.process(&gyro(7.0, 100));
        assert!(detector.process(&accel(40.0, 110)).is_none());
    }

    #[test]
    fn test_reset_clears_buffers_but_not_cooldown() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&gyro(6.0, 0));
        detector.process(&accel(45.0, 10));
        detector.reset();
        assert_eq!(detector.state(), DetectionState::Normal);
        assert_eq!(detector.buffer_sizes(), (0, 0));
        assert_eq!(detector.last_impact_time(), Some(10));
        assert_eq!(detector.crash_count(), 1);
    }

    #[test]
    fn test_accelerometer_gravity_fallback() {
        let mut detector = unfiltered(SensitivityLevel::Medium);
        detector.process(&SensorEvent::new(SensorKind::Gravity, [0.0, 0.0, 9.81], 0));
        // Resting raw accelerometer minus gravity is ~0: a free fall candidate
        detector.process(&SensorEvent::new(SensorKind::Accelerometer, [0.0, 0.0, 9.81], 5));
        assert_eq!(detector.state(), DetectionState::PotentialFall);
    }

    #[test]
    fn test_status_snapshot() {
        let mut detector = unfiltered(SensitivityLevel::High);
        detector.process(&accel(9.8, 0));
        detector.process(&gyro(0.1, 0));
        let status = detector.status(true);
        assert_eq!(status.sample_count, 1);
        assert_eq!(status.accel_buffer_len, 1);
        assert_eq!(status.gyro_buffer_len, 1);
        assert_eq!(status.sensitivity, SensitivityLevel::High);
        assert!(status.running);
    }
}
