use crate::error::{throw_java_exception, BridgeError, JResult};
use crate::session::DetectionSession;
use crash_detector_rs::SensorAvailability;
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jfloat, jint, jintArray, jlong, jstring, JNI_TRUE};
use jni::JNIEnv;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// Global session state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_SESSION: Mutex<Option<Arc<DetectionSession>>> = Mutex::new(None);
}

fn get_session() -> JResult<Arc<DetectionSession>> {
    let guard = GLOBAL_SESSION
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global session lock".to_string()))?;
    guard.as_ref().map(Arc::clone).ok_or(BridgeError::NotInitialized)
}

fn init_logging() {
    #[cfg(target_os = "android")]
    {
        // Only the first call installs the logger
        let _ = android_log::init("CrashDetector");
    }
}

fn throw_and<T>(env: &mut JNIEnv, error: BridgeError, fallback: T) -> T {
    let _ = throw_java_exception(env, &error);
    fallback
}

fn new_jstring(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => throw_and(
            env,
            BridgeError::JniError("Failed to create Java string".to_string()),
            std::ptr::null_mut(),
        ),
    }
}

/// JNI: Create the detection session. Safe to call more than once.
/// Parameters: settings file path (nullable), which sensors the device has
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    settings_path: JString,
    has_linear: jboolean,
    has_accel: jboolean,
    has_gravity: jboolean,
    has_gyro: jboolean,
) -> jint {
    init_logging();
    let availability = SensorAvailability {
        linear_acceleration: has_linear == JNI_TRUE,
        accelerometer: has_accel == JNI_TRUE,
        gravity: has_gravity == JNI_TRUE,
        gyroscope: has_gyro == JNI_TRUE,
    };
    let result = read_path(&mut env, &settings_path).and_then(|path| init_impl(path, availability));
    match result {
        Ok(_) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

fn read_path(env: &mut JNIEnv, path: &JString) -> JResult<Option<PathBuf>> {
    if path.is_null() {
        return Ok(None);
    }
    let path: String = env
        .get_string(path)
        .map_err(|e| BridgeError::JniError(format!("Invalid settings path: {}", e)))?
        .into();
    Ok(Some(PathBuf::from(path)))
}

fn init_impl(settings_path: Option<PathBuf>, availability: SensorAvailability) -> JResult<()> {
    let mut guard = GLOBAL_SESSION
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global session lock".to_string()))?;
    if guard.is_some() {
        log::warn!("Crash detector already initialized, ignoring nativeInit");
        return Ok(());
    }
    log::info!("Sensor availability: {:?}", availability);
    *guard = Some(Arc::new(DetectionSession::new(settings_path, availability)?));
    Ok(())
}

/// JNI: App moved to the foreground
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_onForeground(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_session().and_then(|s| s.on_foreground()) {
        Ok(_) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

/// JNI: App moved to the background
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_onBackground(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_session().and_then(|s| s.on_background()) {
        Ok(_) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

/// JNI: Forward one `onSensorChanged` callback
/// Parameters: Android sensor type, values[0..3], event time in milliseconds
/// Returns: 1 if this event confirmed a crash, 0 otherwise, -1 on error
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_pushSensorEvent(
    mut env: JNIEnv,
    _class: JClass,
    sensor_type: jint,
    x: jfloat,
    y: jfloat,
    z: jfloat,
    timestamp_ms: jlong,
) -> jint {
    match get_session().and_then(|s| s.push_sensor_event(sensor_type, [x, y, z], timestamp_ms)) {
        Ok(Some(_)) => 1,
        Ok(None) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

/// JNI: Persist and apply a sensitivity level ("LOW", "MEDIUM", "HIGH")
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_setSensitivity(
    mut env: JNIEnv,
    _class: JClass,
    name: JString,
) -> jint {
    let name: JResult<String> = env
        .get_string(&name)
        .map(Into::into)
        .map_err(|e| BridgeError::InvalidParameters(format!("Invalid sensitivity name: {}", e)));
    match name.and_then(|name| get_session()?.set_sensitivity(&name)) {
        Ok(_) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

/// JNI: Persist the detection toggle
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_setDetectionEnabled(
    mut env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jint {
    match get_session().and_then(|s| s.set_detection_enabled(enabled == JNI_TRUE)) {
        Ok(_) => 0,
        Err(e) => throw_and(&mut env, e, -1),
    }
}

/// JNI: Android sensor types the host must currently listen to
/// Returns: jintArray (empty while detection is stopped)
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_getRegisteredSensors(
    mut env: JNIEnv,
    _class: JClass,
) -> jintArray {
    let types = match get_session().and_then(|s| s.registered_sensors()) {
        Ok(types) => types,
        Err(e) => return throw_and(&mut env, e, std::ptr::null_mut()),
    };
    match registered_sensors_array(&mut env, &types) {
        Ok(arr) => arr,
        Err(e) => throw_and(&mut env, e, std::ptr::null_mut()),
    }
}

fn registered_sensors_array(env: &mut JNIEnv, types: &[i32]) -> JResult<jintArray> {
    let arr = env
        .new_int_array(types.len() as i32)
        .map_err(|e| BridgeError::JniError(format!("Failed to allocate int array: {}", e)))?;
    env.set_int_array_region(&arr, 0, types)
        .map_err(|e| BridgeError::JniError(format!("Failed to fill int array: {}", e)))?;
    Ok(arr.into_raw())
}

/// JNI: Take the latest unseen crash event
/// Returns: CrashEvent JSON, or null when there is none
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_pollCrashEvent(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_session().and_then(|s| s.poll_crash_event()) {
        Ok(Some(json)) => new_jstring(&mut env, &json),
        Ok(None) => std::ptr::null_mut(),
        Err(e) => throw_and(&mut env, e, std::ptr::null_mut()),
    }
}

/// JNI: Human-readable detector status for the debug screen
#[no_mangle]
pub extern "C" fn Java_net_ritirp_myapplication_service_CrashDetectorBinding_getDebugInfo(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_session().and_then(|s| s.debug_info()) {
        Ok(info) => new_jstring(&mut env, &info),
        Err(e) => throw_and(&mut env, e, std::ptr::null_mut()),
    }
}
