// Crash Detector
// Sensor-fusion crash detection for riders: filtered accelerometer and
// gyroscope streams feed a free-fall / impact state machine.

pub mod config;
pub mod crash_event;
pub mod detector;
pub mod error;
pub mod filter;
pub mod live_status;
pub mod scheduler;
pub mod sensitivity;
pub mod sensors;
pub mod service;
pub mod settings;
pub mod simulation;
pub mod visibility;
pub mod window;


pub use config::{DetectorConfig, GRAVITY};
pub use crash_event::{CrashEvent, CrashEventBus, CrashEventSubscriber};
pub use detector::{CooldownTicket, CrashConfirmation, CrashDetector, DetectionState};
pub use error::{CrashDetectorError, Result};
pub use live_status::DetectorStatus;
pub use scheduler::{CooldownScheduler, ManualCooldownScheduler, TokioCooldownScheduler};
pub use sensitivity::SensitivityLevel;
pub use sensors::{SensorAvailability, SensorEvent, SensorKind, SensorSource};
pub use service::CrashDetectionService;
pub use settings::{CrashSettings, CrashSettingsRepository};
pub use visibility::AppVisibilityObserver;
pub use window::{RollingWindow, SensorSample};
