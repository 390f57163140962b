use thiserror::Error;

/// Crash detector error types
#[derive(Error, Debug)]
pub enum CrashDetectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown sensitivity level: {0}")]
    UnknownSensitivity(String),

    #[error("Unknown sensor type: {0}")]
    UnknownSensor(i32),

    #[error("Sensor registration failed: {0}")]
    SensorFailed(String),

    #[error("Settings storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CrashDetectorError>;

impl CrashDetectorError {
    /// Mutex poisoning is the only way a lock can fail; report which lock.
    pub(crate) fn lock(name: &str) -> Self {
        CrashDetectorError::Internal(format!("Failed to acquire {} lock", name))
    }
}
