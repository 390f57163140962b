use crash_detector_rs::CrashDetectorError;
use jni::JNIEnv;
use thiserror::Error;

/// Errors surfaced to Kotlin as exceptions
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Crash detector not initialized, call nativeInit first")]
    NotInitialized,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Detector(#[from] CrashDetectorError),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, BridgeError>;

fn exception_class(error: &BridgeError) -> &'static str {
    match error {
        BridgeError::NotInitialized => "java/lang/IllegalStateException",
        BridgeError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        BridgeError::Detector(inner) => match inner {
            CrashDetectorError::InvalidConfig(_)
            | CrashDetectorError::UnknownSensitivity(_)
            | CrashDetectorError::UnknownSensor(_) => "java/lang/IllegalArgumentException",
            CrashDetectorError::SensorFailed(_)
            | CrashDetectorError::Storage(_)
            | CrashDetectorError::Serialization(_) => "java/io/IOException",
            CrashDetectorError::Internal(_) => "java/lang/RuntimeException",
        },
        BridgeError::JniError(_) | BridgeError::Internal(_) => "java/lang/RuntimeException",
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BridgeError) -> JResult<()> {
    log::error!("{}", error);
    env.throw_new(exception_class(error), error.to_string())
        .map_err(|_| BridgeError::JniError("Failed to throw exception".to_string()))?;
    Ok(())
}
