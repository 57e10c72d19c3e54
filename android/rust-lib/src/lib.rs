use std::sync::{Arc, Mutex, PoisonError};

use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::{jint, jstring};
use jni::{JNIEnv, JavaVM};

use slux::platform::{tracing_log_sink, LogSink};
use slux::session;

static APP_STATE: Mutex<Option<Arc<AppState>>> = Mutex::new(None);

struct AppState {
    jvm: JavaVM,
    service_ref: GlobalRef,
}

fn app_state() -> Option<Arc<AppState>> {
    APP_STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[no_mangle]
pub extern "system" fn Java_com_slux_slux_SluxVpnService_nativeInitialize(
    env: JNIEnv,
    _class: JClass,
    vpn_service: JObject,
) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("slux"),
    );

    let jvm = match env.get_java_vm() {
        Ok(jvm) => jvm,
        Err(e) => {
            log::error!("nativeInitialize: failed to get JavaVM: {e}");
            return;
        }
    };
    let service_ref = match env.new_global_ref(vpn_service) {
        Ok(r) => r,
        Err(e) => {
            log::error!("nativeInitialize: failed to create global ref: {e}");
            return;
        }
    };

    let state = Arc::new(AppState { jvm, service_ref });
    session::global().set_log_sink(service_log_sink(Arc::clone(&state)));
    *APP_STATE.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);

    log::info!("slux native initialized ({})", slux::ffi::build_version());
}

#[no_mangle]
pub extern "system" fn Java_com_slux_slux_SluxVpnService_nativeShutdown(
    _env: JNIEnv,
    _class: JClass,
) {
    slux::ffi::stop_session_guarded();
    session::global().set_log_sink(tracing_log_sink());
    APP_STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    log::info!("slux native shutdown");
}

/// Returns null on success, otherwise the error message.
#[no_mangle]
pub extern "system" fn Java_com_slux_slux_SluxVpnService_nativeStart(
    mut env: JNIEnv,
    _class: JClass,
    config: JString,
    tun_fd: jint,
) -> jstring {
    let config: String = match env.get_string(&config) {
        Ok(s) => s.into(),
        Err(e) => return new_jstring(&mut env, &format!("invalid argument: config: {e}")),
    };

    log::info!("nativeStart called; tun_fd={}", tun_fd);

    match slux::ffi::start_session_guarded(&config, tun_fd) {
        None => std::ptr::null_mut(),
        Some(message) => new_jstring(&mut env, &message),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_slux_slux_SluxVpnService_nativeStop(_env: JNIEnv, _class: JClass) {
    slux::ffi::stop_session_guarded();
    log::info!("nativeStop: session stopped");
}

#[no_mangle]
pub extern "system" fn Java_com_slux_slux_SluxVpnService_nativeVersion(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    new_jstring(&mut env, slux::ffi::build_version())
}

fn new_jstring(env: &mut JNIEnv, s: &str) -> jstring {
    match env.new_string(s) {
        Ok(js) => js.into_raw(),
        Err(e) => {
            log::error!("failed to create JString: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Engine log lines go to `SluxVpnService.writeLog(String)`; logcat when
/// the call fails.
fn service_log_sink(state: Arc<AppState>) -> LogSink {
    Arc::new(move |line: &str| {
        if let Err(e) = write_service_log(&state, line) {
            log::info!("{line}");
            log::debug!("writeLog callback failed: {e}");
        }
    })
}

fn write_service_log(state: &AppState, line: &str) -> Result<(), String> {
    let mut env = state
        .jvm
        .attach_current_thread()
        .map_err(|e| format!("attach_current_thread failed: {e}"))?;
    let message = env
        .new_string(line)
        .map_err(|e| format!("new_string failed: {e}"))?;
    env.call_method(
        state.service_ref.as_obj(),
        "writeLog",
        "(Ljava/lang/String;)V",
        &[JValue::Object(&message)],
    )
    .map_err(|e| format!("writeLog call failed: {e}"))?;
    Ok(())
}
