//! C entry points for hosts that link the library directly.
//!
//! ```c
//! char *err = start(config_json, tun_fd);
//! if (err != NULL) { log(err); free_string(err); }
//! ...
//! stop();
//! ```

#[cfg(feature = "ffi")]
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use crate::engine;
use crate::error::{AppError, Result};
use crate::session;
#[cfg(feature = "ffi")]
use crate::{logging, platform::tracing_log_sink, platform::LogSink};

/// Receives one NUL-terminated UTF-8 log line per call.
#[cfg(feature = "ffi")]
pub type LogCallback = extern "C" fn(message: *const c_char);

static VERSION: &str = concat!(env!("SLUX_BUILD_VERSION"), "\0");

/// Build version of this library.
#[must_use]
pub fn build_version() -> &'static str {
    VERSION.trim_end_matches('\0')
}

/// Start the global session with the installed engine factory.
///
/// Shared by the C and JNI entry points.
pub fn start_session(config_text: &str, tun_fd: i32) -> Result<()> {
    let factory = engine::installed().ok_or(AppError::EngineUnavailable)?;
    session::global().start(factory.as_ref(), config_text, tun_fd)
}

/// Run `start_session`, turning errors and panics into a message.
#[must_use]
pub fn start_session_guarded(config_text: &str, tun_fd: i32) -> Option<String> {
    match panic::catch_unwind(AssertUnwindSafe(|| start_session(config_text, tun_fd))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "start_failed");
            Some(err.to_string())
        }
        Err(_) => {
            session::global().stop();
            Some("internal error: start panicked".to_string())
        }
    }
}

pub fn stop_session_guarded() {
    if panic::catch_unwind(AssertUnwindSafe(|| session::global().stop())).is_err() {
        tracing::error!("stop panicked");
    }
}

#[cfg(feature = "ffi")]
fn into_c_string(message: String) -> *mut c_char {
    let message = message.replace('\0', " ");
    match CString::new(message) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Returns NULL on success, otherwise an error message the caller must
/// release with [`free_string`].
///
/// # Safety
/// `config` must be NULL or point to a NUL-terminated string.
#[cfg(feature = "ffi")]
#[no_mangle]
pub unsafe extern "C" fn start(config: *const c_char, tun_fd: c_int) -> *mut c_char {
    if config.is_null() {
        return into_c_string(AppError::InvalidArgument("config is null".into()).to_string());
    }
    let config = match CStr::from_ptr(config).to_str() {
        Ok(s) => s,
        Err(e) => {
            return into_c_string(
                AppError::InvalidArgument(format!("config is not UTF-8: {e}")).to_string(),
            )
        }
    };
    match start_session_guarded(config, tun_fd) {
        None => std::ptr::null_mut(),
        Some(message) => into_c_string(message),
    }
}

#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn stop() {
    stop_session_guarded();
}

#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn version() -> *const c_char {
    VERSION.as_ptr().cast()
}

/// Route engine and library log lines to `callback`, replacing any earlier
/// one. Engine lines switch at the next `start`. NULL detaches the host
/// callback: engine lines go back to the library log and library records
/// are dropped.
#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn set_log_callback(callback: Option<LogCallback>) {
    match callback {
        Some(cb) => {
            let sink: LogSink = std::sync::Arc::new(move |line: &str| {
                if let Ok(cstr) = CString::new(line.replace('\0', " ")) {
                    cb(cstr.as_ptr());
                }
            });
            logging::init_platform(std::sync::Arc::clone(&sink), false);
            session::global().set_log_sink(sink);
        }
        None => {
            logging::detach_platform();
            session::global().set_log_sink(tracing_log_sink());
        }
    }
}

/// # Safety
/// `s` must be NULL or a pointer returned by [`start`], released once.
#[cfg(feature = "ffi")]
#[no_mangle]
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_nul_terminated() {
        assert!(VERSION.ends_with('\0'));
        assert!(!build_version().is_empty());
        assert!(!build_version().contains('\0'));
    }

    #[cfg(feature = "ffi")]
    #[test]
    fn test_into_c_string_strips_nul() {
        let ptr = into_c_string("bad\0input".to_string());
        assert!(!ptr.is_null());
        let back = unsafe { CString::from_raw(ptr) };
        assert_eq!(back.to_str().unwrap(), "bad input");
    }
}
