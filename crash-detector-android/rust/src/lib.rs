// Crash Detector Android JNI Library
// Exposes the Rust crash detection core to Kotlin via JNI

pub mod android_jni;
pub mod error;
pub mod sensor_receiver;
pub mod session;

pub use error::{BridgeError, JResult};
pub use sensor_receiver::AndroidSensorSource;
pub use session::DetectionSession;
